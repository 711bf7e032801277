use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::time::Duration;

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::api::{
  DEFAULT_BASE_URL,
  DEFAULT_TIMEOUT
};

pub const RC_ENV: &str = "FERRYRC";
pub const TOKEN_ENV: &str =
  "FERRY_API_TOKEN";

/// Flat `key = value` settings layered as
/// defaults, rc file, then `--rc` overrides.
#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>
}

impl Default for Config {
  fn default() -> Self {
    let map = [
      ("data.location", DEFAULT_DATA_DIR),
      ("api.url", DEFAULT_BASE_URL),
      ("api.timeout", "30"),
      ("color", "on"),
      ("sync.auto", "on")
    ]
    .into_iter()
    .map(|(key, value)| {
      (key.to_string(), value.to_string())
    })
    .collect();

    Self { map }
  }
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    let Some(path) =
      resolve_rc_path(rc_override)
    else {
      debug!(
        "no ferryrc found; using \
         defaults"
      );
      return Ok(cfg);
    };

    info!(rc = %path.display(), "loading ferryrc");
    let text = fs::read_to_string(&path)
      .with_context(|| {
        format!(
          "failed to read {}",
          path.display()
        )
      })?;
    cfg
      .map
      .extend(parse_rc(&text, &path)?);
    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      if key == "api.token" {
        debug!(key = %key, "applying override");
      } else {
        debug!(key = %key, value = %v, "applying override");
      }
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self
      .map
      .get(key)
      .map(|v| parse_bool(v))
  }

  pub fn api_url(&self) -> String {
    self
      .get("api.url")
      .map(|url| {
        url
          .trim_end_matches('/')
          .to_string()
      })
      .unwrap_or_else(|| {
        DEFAULT_BASE_URL.to_string()
      })
  }

  pub fn api_timeout(
    &self
  ) -> anyhow::Result<Duration> {
    let Some(raw) =
      self.get("api.timeout")
    else {
      return Ok(DEFAULT_TIMEOUT);
    };
    let secs: u64 =
      raw.trim().parse().with_context(
        || {
          format!(
            "api.timeout must be a \
             number of seconds, got \
             {raw:?}"
          )
        }
      )?;
    if secs == 0 {
      return Err(anyhow!(
        "api.timeout must be at \
         least 1 second"
      ));
    }
    Ok(Duration::from_secs(secs))
  }

  /// Token from the rc file or the
  /// environment. The token saved by
  /// `ferry login` is consulted by the
  /// caller.
  pub fn api_token(
    &self
  ) -> Option<String> {
    self
      .get("api.token")
      .or_else(|| {
        std::env::var(TOKEN_ENV).ok()
      })
      .map(|token| {
        token.trim().to_string()
      })
      .filter(|token| !token.is_empty())
  }

  pub fn auto_sync(&self) -> bool {
    self
      .get_bool("sync.auto")
      .unwrap_or(true)
  }
}

/// Keys ferry reads. Anything else in an
/// rc file is kept but flagged.
const KNOWN_KEYS: [&str; 6] = [
  "data.location",
  "api.url",
  "api.timeout",
  "api.token",
  "color",
  "sync.auto"
];

const DEFAULT_DATA_DIR: &str = "~/.ferry";

/// Parses `key = value` lines. Blank
/// lines and `#` comments are skipped.
fn parse_rc(
  text: &str,
  origin: &Path
) -> anyhow::Result<Vec<(String, String)>>
{
  let mut entries = Vec::new();
  for (idx, raw_line) in
    text.lines().enumerate()
  {
    let line = raw_line
      .split_once('#')
      .map_or(raw_line, |(before, _)| {
        before
      })
      .trim();
    if line.is_empty() {
      continue;
    }

    let (k, v) = line
      .split_once('=')
      .ok_or_else(|| {
        anyhow!(
          "invalid config line \
           {}:{}: {}",
          origin.display(),
          idx + 1,
          raw_line.trim()
        )
      })?;
    let key = k.trim();
    if key.is_empty() {
      return Err(anyhow!(
        "missing key at {}:{}",
        origin.display(),
        idx + 1
      ));
    }
    if !KNOWN_KEYS.contains(&key) {
      warn!(key, file = %origin.display(), "unknown config key");
    }
    trace!(key, "loaded config key");
    entries.push((
      key.to_string(),
      v.trim().to_string()
    ));
  }
  Ok(entries)
}

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = match override_dir {
    | Some(path) => path.to_path_buf(),
    | None => {
      let location = cfg
        .get("data.location")
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| {
          DEFAULT_DATA_DIR.to_string()
        });
      expand_tilde(&location)?
    }
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

/// `--config` wins, then `$FERRYRC`
/// (`/dev/null` disables the rc file),
/// then `~/.ferryrc` when it exists.
fn resolve_rc_path(
  override_path: Option<&Path>
) -> Option<PathBuf> {
  if let Some(path) = override_path {
    return Some(path.to_path_buf());
  }

  match std::env::var_os(RC_ENV) {
    | Some(rc) if rc == "/dev/null" => {
      None
    }
    | Some(rc) => Some(PathBuf::from(rc)),
    | None => dirs::home_dir()
      .map(|home| home.join(".ferryrc"))
      .filter(|candidate| {
        candidate.exists()
      })
  }
}

fn expand_tilde(
  raw: &str
) -> anyhow::Result<PathBuf> {
  match raw.strip_prefix("~/") {
    | Some(rest) => dirs::home_dir()
      .map(|home| home.join(rest))
      .ok_or_else(|| {
        anyhow!(
          "cannot determine home \
           directory for {raw}"
        )
      }),
    | None => Ok(PathBuf::from(raw))
  }
}

fn parse_bool(s: &str) -> bool {
  matches!(
    s.trim()
      .to_ascii_lowercase()
      .as_str(),
    "1" | "y" | "yes" | "on" | "true"
  )
}
