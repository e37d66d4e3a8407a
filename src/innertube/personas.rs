use crate::configs::ResolverConfig;

/// One synthetic client identity presented to the player endpoint. Identity
/// strings follow what the corresponding real clients send today; bumping a
/// version only needs a change here.
#[derive(Debug)]
pub struct Persona {
  pub name: &'static str,
  pub client_name: &'static str,
  pub client_id: &'static str,
  pub client_version: &'static str,
  pub user_agent: &'static str,
  pub os_name: Option<&'static str>,
  pub os_version: Option<&'static str>,
  pub device_make: Option<&'static str>,
  pub device_model: Option<&'static str>,
  pub android_sdk_version: Option<&'static str>,
  /// Present the request as if the player were embedded in this page.
  pub embed_url: Option<&'static str>,
  /// Extra protocol params blob some identities expect.
  pub params: Option<&'static str>,
  /// Streams come back signature-protected and need the player script.
  pub requires_script: bool,
  pub supports_auth: bool,
  pub live_capable: bool,
}

pub static ANDROID: Persona = Persona {
  name: "Android",
  client_name: "ANDROID",
  client_id: "3",
  client_version: "20.01.35",
  user_agent: "com.google.android.youtube/20.01.35 (Linux; U; Android 14) identity",
  os_name: Some("Android"),
  os_version: Some("14"),
  device_make: Some("Google"),
  device_model: Some("Pixel 6"),
  android_sdk_version: Some("34"),
  embed_url: None,
  params: None,
  requires_script: false,
  supports_auth: false,
  live_capable: true,
};

pub static IOS: Persona = Persona {
  name: "Ios",
  client_name: "IOS",
  client_id: "5",
  client_version: "21.02.1",
  user_agent: "com.google.ios.youtube/21.02.1 (iPhone16,2; U; CPU iOS 18_2 like Mac OS X;)",
  os_name: Some("iPhone"),
  os_version: Some("18.2.22C152"),
  device_make: Some("Apple"),
  device_model: Some("iPhone16,2"),
  android_sdk_version: None,
  embed_url: None,
  params: None,
  requires_script: false,
  supports_auth: false,
  live_capable: true,
};

pub static ANDROID_VR: Persona = Persona {
  name: "AndroidVr",
  client_name: "ANDROID_VR",
  client_id: "28",
  client_version: "1.61.48",
  user_agent: "Mozilla/5.0 (Linux; Android 14; Pixel 8 Pro Build/UQ1A.240205.002; wv) \
  AppleWebKit/537.36 (KHTML, like Gecko) Version/4.0 \
  Chrome/121.0.6167.164 Mobile Safari/537.36 YouTubeVR/1.61.48 (gzip)",
  os_name: Some("Android"),
  os_version: Some("12L"),
  device_make: Some("Oculus"),
  device_model: Some("Quest 3"),
  android_sdk_version: Some("32"),
  embed_url: None,
  params: None,
  requires_script: false,
  supports_auth: false,
  live_capable: false,
};

pub static TV: Persona = Persona {
  name: "Tv",
  client_name: "TVHTML5",
  client_id: "7",
  client_version: "7.20250219.19.00",
  user_agent: "Mozilla/5.0 (SmartHub; SMART-TV; U; Linux/SmartTV; Maple2012) \
  AppleWebKit/534.7 (KHTML, like Gecko) SmartTV Safari/534.7",
  os_name: None,
  os_version: None,
  device_make: None,
  device_model: None,
  android_sdk_version: None,
  embed_url: None,
  params: None,
  requires_script: true,
  supports_auth: true,
  live_capable: true,
};

pub static TV_EMBEDDED: Persona = Persona {
  name: "TvEmbedded",
  client_name: "TVHTML5_SIMPLY_EMBEDDED_PLAYER",
  client_id: "85",
  client_version: "2.0",
  user_agent: "Mozilla/5.0 (Linux armeabi-v7a; Android 7.1.2; Fire OS 6.0) Cobalt/22.lts.3.306369-gold (unlike Gecko) v8/8.8.278.8-jit gles Starboard/13, Amazon_ATV_mediatek8695_2019/NS6294 (Amazon, AFTMM, Wireless) com.amazon.firetv.youtube/22.3.r2.v66.0",
  os_name: None,
  os_version: None,
  device_make: None,
  device_model: None,
  android_sdk_version: None,
  embed_url: Some("https://www.youtube.com/tv"),
  params: Some("2AMB"),
  requires_script: true,
  supports_auth: true,
  live_capable: true,
};

pub static WEB: Persona = Persona {
  name: "Web",
  client_name: "WEB",
  client_id: "1",
  client_version: "2.20260114.01.00",
  user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
  AppleWebKit/537.36 (KHTML, like Gecko) Chrome/143.0.0.0 Safari/537.36",
  os_name: Some("Windows"),
  os_version: Some("10.0"),
  device_make: None,
  device_model: None,
  android_sdk_version: None,
  embed_url: None,
  params: None,
  requires_script: true,
  supports_auth: true,
  live_capable: true,
};

pub static WEB_EMBEDDED: Persona = Persona {
  name: "WebEmbedded",
  client_name: "WEB_EMBEDDED_PLAYER",
  client_id: "56",
  client_version: "1.20250219.01.00",
  user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
  AppleWebKit/537.36 (KHTML, like Gecko) Chrome/134.0.0.0 Safari/537.36",
  os_name: Some("Windows"),
  os_version: Some("10.0"),
  device_make: None,
  device_model: None,
  android_sdk_version: None,
  embed_url: Some("https://www.google.com"),
  params: None,
  requires_script: true,
  supports_auth: true,
  live_capable: true,
};

pub static MWEB: Persona = Persona {
  name: "Mweb",
  client_name: "MWEB",
  client_id: "2",
  client_version: "2.20250311.03.00",
  user_agent: "Mozilla/5.0 (iPad; CPU OS 16_7_10 like Mac OS X) \
  AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.6 Mobile/15E148 Safari/604.1",
  os_name: None,
  os_version: None,
  device_make: None,
  device_model: None,
  android_sdk_version: None,
  embed_url: None,
  params: None,
  requires_script: true,
  supports_auth: true,
  live_capable: true,
};

/// An ordered run of personas tried as a unit by the orchestrator.
pub struct PersonaGroup {
  pub name: &'static str,
  pub personas: Vec<&'static Persona>,
  /// A persona answering "not served on this identity" moves to the next
  /// persona instead of ending the group.
  pub allow_skip: bool,
  /// The group may be replayed once with credentials attached.
  pub restart_with_auth: bool,
}

/// Produces the ordered persona groups for one resolution, shaped by the
/// resolver configuration. Construction is cheap; a registry lives for one
/// resolution call.
pub struct ClientPersonaRegistry {
  use_mpd: bool,
  ask_for_quality: bool,
  extended_codecs: bool,
}

impl ClientPersonaRegistry {
  pub fn new(config: &ResolverConfig) -> Self {
    Self {
      use_mpd: config.use_mpd,
      ask_for_quality: config.ask_for_quality,
      extended_codecs: config.allow_vp9 || config.allow_av1,
    }
  }

  pub fn groups(&self) -> Vec<PersonaGroup> {
    let mut groups = Vec::new();
    if self.use_mpd {
      groups.push(PersonaGroup {
        name: "mpd_only",
        personas: vec![&MWEB, &TV],
        allow_skip: true,
        restart_with_auth: true,
      });
    } else if self.ask_for_quality {
      groups.push(PersonaGroup {
        name: "ask_quality",
        personas: vec![&WEB_EMBEDDED, &TV_EMBEDDED],
        allow_skip: true,
        restart_with_auth: true,
      });
    } else {
      groups.push(PersonaGroup {
        name: "initial",
        personas: vec![&TV_EMBEDDED, &ANDROID],
        allow_skip: true,
        restart_with_auth: true,
      });
      if self.extended_codecs {
        groups.push(PersonaGroup {
          name: "extended_codecs",
          personas: vec![&ANDROID_VR, &WEB],
          allow_skip: true,
          restart_with_auth: false,
        });
      }
    }
    groups.push(PersonaGroup {
      name: "missing_streams",
      personas: vec![&IOS, &MWEB],
      allow_skip: false,
      restart_with_auth: false,
    });
    groups
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_config_starts_with_the_initial_group() {
    let registry = ClientPersonaRegistry::new(&ResolverConfig::default());
    let groups = registry.groups();
    assert_eq!(groups[0].name, "initial");
    assert_eq!(groups.last().map(|g| g.name), Some("missing_streams"));
  }

  #[test]
  fn manifest_mode_overrides_the_persona_order() {
    let config = ResolverConfig {
      use_mpd: true,
      ..ResolverConfig::default()
    };
    let registry = ClientPersonaRegistry::new(&config);
    let groups = registry.groups();
    assert_eq!(groups[0].name, "mpd_only");
    assert!(groups.iter().all(|g| g.name != "initial"));
  }

  #[test]
  fn quality_prompt_mode_uses_embedded_identities() {
    let config = ResolverConfig {
      ask_for_quality: true,
      ..ResolverConfig::default()
    };
    let registry = ClientPersonaRegistry::new(&config);
    assert_eq!(registry.groups()[0].name, "ask_quality");
  }

  #[test]
  fn codec_gates_drop_the_extended_group() {
    let config = ResolverConfig {
      allow_vp9: false,
      allow_av1: false,
      ..ResolverConfig::default()
    };
    let registry = ClientPersonaRegistry::new(&config);
    assert!(registry.groups().iter().all(|g| g.name != "extended_codecs"));
  }

  #[test]
  fn auth_restart_is_limited_to_auth_capable_groups() {
    let registry = ClientPersonaRegistry::new(&ResolverConfig::default());
    for group in registry.groups() {
      if group.restart_with_auth {
        assert!(
          group.personas.iter().any(|p| p.supports_auth),
          "group {} restarts with auth but has no auth-capable persona",
          group.name
        );
      }
    }
  }
}
