use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow,
  bail
};
use tracing::{
  debug,
  info,
  warn
};

pub const RC_ENV_VAR: &str =
  "MEDCONSOLERC";

pub const RC_FILE_NAME: &str =
  ".medconsolerc";

/// Every key the rc file and `--set`
/// accept.
pub const KEYS: [&str; 5] = [
  "data.location",
  "snapshot.location",
  "api.url",
  "timezone",
  "color"
];

/// Console settings after the rc file
/// and command-line overrides are
/// applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
  pub data_location:     PathBuf,
  pub snapshot_location: Option<PathBuf>,
  pub api_url:           Option<String>,
  pub timezone:          String,
  pub color:             bool
}

impl Default for Config {
  fn default() -> Self {
    Self {
      data_location:     PathBuf::from(
        "~/.medconsole"
      ),
      snapshot_location: None,
      api_url:           None,
      timezone:          "UTC"
        .to_string(),
      color:             true
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Self::default();

    let Some(path) =
      rc_path(rc_override)
    else {
      debug!("no console rc; using defaults");
      return Ok(cfg);
    };

    let path = expand_tilde(&path);
    info!(rc = %path.display(), "loading console rc");
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;
    cfg.apply_rc(&path, &text)?;
    Ok(cfg)
  }

  /// `key = value` lines; `#` starts
  /// a comment.
  fn apply_rc(
    &mut self,
    origin: &Path,
    text: &str
  ) -> anyhow::Result<()> {
    for (idx, raw_line) in
      text.lines().enumerate()
    {
      let line = raw_line
        .split_once('#')
        .map_or(raw_line, |(b, _)| b)
        .trim();
      if line.is_empty() {
        continue;
      }

      let (key, value) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "{}:{}: expected `key = \
             value`, got: {raw_line}",
            origin.display(),
            idx + 1
          )
        })?;
      self
        .set(key.trim(), value.trim())
        .with_context(|| {
          format!(
            "{}:{}",
            origin.display(),
            idx + 1
          )
        })?;
    }
    Ok(())
  }

  pub fn set(
    &mut self,
    key: &str,
    value: &str
  ) -> anyhow::Result<()> {
    let value = value.trim();
    match key {
      | "data.location" => {
        if value.is_empty() {
          bail!(
            "data.location cannot be \
             empty"
          );
        }
        self.data_location =
          PathBuf::from(value);
      }
      | "snapshot.location" => {
        self.snapshot_location =
          non_empty(value)
            .map(PathBuf::from);
      }
      | "api.url" => {
        self.api_url = non_empty(value);
      }
      | "timezone" => {
        self.timezone = non_empty(value)
          .unwrap_or_else(|| {
            "UTC".to_string()
          });
      }
      | "color" => {
        self.color = parse_bool(value)?;
      }
      | other => {
        bail!(
          "unknown config key \
           '{other}' (expected one of: \
           {})",
          KEYS.join(", ")
        )
      }
    }
    debug!(key, value, "config key set");
    Ok(())
  }

  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) -> anyhow::Result<()>
  where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (key, value) in overrides {
      self.set(&key, &value).with_context(
        || format!("invalid --set {key}")
      )?;
    }
    Ok(())
  }

  /// `--data` wins over
  /// `data.location`. The directory is
  /// created when missing.
  pub fn data_dir(
    &self,
    override_dir: Option<&Path>
  ) -> anyhow::Result<PathBuf> {
    let dir = override_dir
      .map(Path::to_path_buf)
      .unwrap_or_else(|| {
        expand_tilde(
          &self.data_location
        )
      });

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

  /// Directory with the JSON exports
  /// used when no `api.url` is set.
  pub fn snapshot_dir(
    &self,
    data_dir: &Path
  ) -> PathBuf {
    self
      .snapshot_location
      .as_deref()
      .map(expand_tilde)
      .unwrap_or_else(|| {
        data_dir.join("snapshot")
      })
  }
}

fn non_empty(
  value: &str
) -> Option<String> {
  Some(value.to_string())
    .filter(|v| !v.is_empty())
}

/// `--rc`, then `MEDCONSOLERC`
/// (`/dev/null` disables the rc), then
/// `~/.medconsolerc` when it exists.
fn rc_path(
  override_path: Option<&Path>
) -> Option<PathBuf> {
  if let Some(path) = override_path {
    return Some(path.to_path_buf());
  }

  if let Ok(rc_env) =
    std::env::var(RC_ENV_VAR)
  {
    return (rc_env != "/dev/null")
      .then(|| PathBuf::from(rc_env));
  }

  let Some(home) = dirs::home_dir()
  else {
    warn!(
      "cannot determine home \
       directory; skipping rc lookup"
    );
    return None;
  };
  Some(home.join(RC_FILE_NAME))
    .filter(|candidate| {
      candidate.exists()
    })
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  if let Ok(rest) =
    path.strip_prefix("~")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_bool(
  raw: &str
) -> anyhow::Result<bool> {
  match raw
    .trim()
    .to_ascii_lowercase()
    .as_str()
  {
    | "1" | "y" | "yes" | "on"
    | "true" => Ok(true),
    | "0" | "n" | "no" | "off"
    | "false" => Ok(false),
    | other => {
      Err(anyhow!(
        "expected on/off, got \
         '{other}'"
      ))
    }
  }
}
