use std::path::{Path, PathBuf};

// Lookup helpers over a parsed `toml::Value`. `tomlget_or!` falls back to a default (and says so
// in the log), `tomlget_opt!` yields an `Option`, and `tomlget!` bails out of the enclosing
// function with a `String` error.

macro_rules! tomlget_or {
    ($cfg:expr, $sec:expr, $key:expr, as_str, $or:expr) => {
        $cfg.get($sec)
            .and_then(|sec| sec.get($key))
            .map(|val| val.as_str())
            .unwrap_or_else(|| {
                log::debug!(
                    "no {}:{} in config; proceeding with default {:?}",
                    $sec,
                    $key,
                    $or
                );
                Some($or)
            })
            .unwrap_or_else(|| {
                log::warn!(
                    "failed to convert {}:{} to string; proceeding with default {:?}",
                    $sec,
                    $key,
                    $or
                );
                $or
            })
    };
    ($cfg:expr, $sec:expr, $key:expr, as_bool, $or:expr) => {
        $cfg.get($sec)
            .and_then(|sec| sec.get($key))
            .map(|val| val.as_bool())
            .unwrap_or_else(|| {
                log::debug!(
                    "no {}:{} in config; proceeding with default {:?}",
                    $sec,
                    $key,
                    $or
                );
                Some($or)
            })
            .unwrap_or_else(|| {
                log::warn!(
                    "failed to convert {}:{} to bool; proceeding with default {:?}",
                    $sec,
                    $key,
                    $or
                );
                $or
            })
    };
    ($cfg:expr, $sec:expr, $key:expr, $conv:ident, $as:ty, $or:expr) => {
        $cfg.get($sec)
            .and_then(|sec| sec.get($key))
            .map(|val| val.$conv())
            .unwrap_or_else(|| {
                log::debug!(
                    "no {}:{} in config; proceeding with default {:?}",
                    $sec,
                    $key,
                    $or
                );
                Some($or)
            })
            .unwrap_or_else(|| {
                log::warn!(
                    "failed to convert {}:{} to {}; proceeding with default {:?}",
                    $sec,
                    $key,
                    stringify!($as),
                    $or
                );
                $or
            }) as $as
    };
}

macro_rules! tomlget_opt {
    ($cfg:expr, $sec:expr, $key:expr, as_str) => {
        $cfg.get($sec)
            .and_then(|sec| sec.get($key))
            .and_then(|val| val.as_str())
    };
    ($cfg:expr, $sec:expr, $key:expr, $conv:ident, $as:ty) => {
        $cfg.get($sec)
            .and_then(|sec| sec.get($key))
            .and_then(|val| val.$conv())
            .map(|val| val as $as)
    };
}

macro_rules! tomlget {
    ($cfg:expr, $sec:expr, $key:expr, $conv:ident, $as:ty) => {
        $cfg.get($sec)
            .ok_or_else(|| format!("failed to get section {}", $sec))?
            .get($key)
            .ok_or_else(|| format!("failed to get key {}:{}", $sec, $key))?
            .$conv()
            .ok_or_else(|| format!("failed to convert {}:{} to {}", $sec, $key, stringify!($as)))?
            as $as
    };
}

/// Look for `file_name` as given if absolute, otherwise in the working directory and then next to
/// the executable.
#[must_use]
pub fn find_file(file_name: &Path) -> Option<PathBuf> {
    if file_name.is_absolute() {
        return file_name.exists().then(|| file_name.into());
    }
    if let Ok(cwd) = std::env::current_dir() {
        if cwd.join(file_name).exists() {
            return Some(cwd.join(file_name));
        }
    }
    if let Ok(exe) = std::env::current_exe() {
        if exe.parent()?.join(file_name).exists() {
            return Some(exe.parent()?.join(file_name));
        }
    }
    None
}

pub(crate) use {tomlget, tomlget_opt, tomlget_or};
