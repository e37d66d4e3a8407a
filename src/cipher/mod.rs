pub mod extract;
pub mod interpreter;
pub mod optable;
pub mod script;
pub mod signature;
pub mod throttling;

pub use interpreter::{InterpretError, OpKind, Primitive, Program, Step};
pub use optable::OpTable;
pub use script::{CompiledScript, PlayerScriptManager, StreamUnlocker};
pub use signature::SignatureCipherDecoder;
pub use throttling::ThrottlingParameterCalculator;
