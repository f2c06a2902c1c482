use std::path::PathBuf;
use std::str::FromStr;

use crate::app_config::{
    AdmissionConfig, AdmissionPolicy, AppConfig, DeepProbeConfig, FingerprintConfig, ShardConfig,
};
use crate::timepoint::TimepointSet;
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if a value fails to parse or violates its bounds.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if a value fails to parse or violates its bounds.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

fn invalid(var: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason: reason.into(),
    }
}

/// Build application configuration using the provided env-var lookup function.
///
/// Every variable is optional; unset variables take the defaults from
/// [`AppConfig::default`].
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let defaults = AppConfig::default();

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    fn parse_value<T: FromStr>(var: &str, raw: &str) -> Result<T, ConfigError>
    where
        T::Err: std::fmt::Display,
    {
        raw.trim()
            .parse::<T>()
            .map_err(|e| invalid(var, e.to_string()))
    }

    let parse_usize = |var: &str, default: usize| -> Result<usize, ConfigError> {
        lookup(var).map_or(Ok(default), |raw| parse_value(var, &raw))
    };
    let parse_u32 = |var: &str, default: u32| -> Result<u32, ConfigError> {
        lookup(var).map_or(Ok(default), |raw| parse_value(var, &raw))
    };
    let parse_u64 = |var: &str, default: u64| -> Result<u64, ConfigError> {
        lookup(var).map_or(Ok(default), |raw| parse_value(var, &raw))
    };
    let parse_ratio = |var: &str, default: f64| -> Result<f64, ConfigError> {
        let value: f64 = lookup(var).map_or(Ok(default), |raw| parse_value(var, &raw))?;
        if (0.0..=1.0).contains(&value) {
            Ok(value)
        } else {
            Err(invalid(var, format!("{value} is outside [0, 1]")))
        }
    };
    let parse_positive_f64 = |var: &str, default: f64| -> Result<f64, ConfigError> {
        let value: f64 = lookup(var).map_or(Ok(default), |raw| parse_value(var, &raw))?;
        if value.is_finite() && value > 0.0 {
            Ok(value)
        } else {
            Err(invalid(var, format!("{value} must be a positive number")))
        }
    };

    let log_level = or_default("LIVECHECK_LOG_LEVEL", &defaults.log_level);
    let cache_dir = PathBuf::from(or_default(
        "LIVECHECK_CACHE_DIR",
        &defaults.cache_dir.to_string_lossy(),
    ));

    let timepoints = match lookup("LIVECHECK_TIMEPOINTS") {
        Ok(raw) => TimepointSet::new(split_list(&raw))
            .map_err(|e| invalid("LIVECHECK_TIMEPOINTS", e.to_string()))?,
        Err(_) => defaults.timepoints,
    };

    let policy_defaults = AdmissionPolicy::default();
    let policy = AdmissionPolicy {
        high_success_rate: parse_ratio(
            "LIVECHECK_PROBE_HIGH_SUCCESS_RATE",
            policy_defaults.high_success_rate,
        )?,
        low_success_rate: parse_ratio(
            "LIVECHECK_PROBE_LOW_SUCCESS_RATE",
            policy_defaults.low_success_rate,
        )?,
        grow_factor: parse_positive_f64(
            "LIVECHECK_PROBE_GROW_FACTOR",
            policy_defaults.grow_factor,
        )?,
        shrink_factor: parse_ratio(
            "LIVECHECK_PROBE_SHRINK_FACTOR",
            policy_defaults.shrink_factor,
        )?,
        timeout_step_secs: parse_u64(
            "LIVECHECK_PROBE_TIMEOUT_STEP_SECS",
            policy_defaults.timeout_step_secs,
        )?,
        raise_latency_ratio: parse_ratio(
            "LIVECHECK_PROBE_RAISE_LATENCY_RATIO",
            policy_defaults.raise_latency_ratio,
        )?,
        lower_latency_ratio: parse_ratio(
            "LIVECHECK_PROBE_LOWER_LATENCY_RATIO",
            policy_defaults.lower_latency_ratio,
        )?,
    };
    if policy.low_success_rate > policy.high_success_rate {
        return Err(invalid(
            "LIVECHECK_PROBE_LOW_SUCCESS_RATE",
            "must not exceed LIVECHECK_PROBE_HIGH_SUCCESS_RATE",
        ));
    }

    let admission_defaults = defaults.admission;
    let admission = AdmissionConfig {
        initial_concurrency: parse_usize(
            "LIVECHECK_PROBE_INITIAL_CONCURRENCY",
            admission_defaults.initial_concurrency,
        )?,
        min_concurrency: parse_usize(
            "LIVECHECK_PROBE_MIN_CONCURRENCY",
            admission_defaults.min_concurrency,
        )?,
        max_concurrency: parse_usize(
            "LIVECHECK_PROBE_MAX_CONCURRENCY",
            admission_defaults.max_concurrency,
        )?,
        initial_timeout_secs: parse_u64(
            "LIVECHECK_PROBE_INITIAL_TIMEOUT_SECS",
            admission_defaults.initial_timeout_secs,
        )?,
        min_timeout_secs: parse_u64(
            "LIVECHECK_PROBE_MIN_TIMEOUT_SECS",
            admission_defaults.min_timeout_secs,
        )?,
        max_timeout_secs: parse_u64(
            "LIVECHECK_PROBE_MAX_TIMEOUT_SECS",
            admission_defaults.max_timeout_secs,
        )?,
        batch_size: parse_usize("LIVECHECK_PROBE_BATCH_SIZE", admission_defaults.batch_size)?,
        max_attempts: parse_u32(
            "LIVECHECK_PROBE_MAX_ATTEMPTS",
            admission_defaults.max_attempts,
        )?,
        backoff_base_ms: parse_u64(
            "LIVECHECK_PROBE_BACKOFF_BASE_MS",
            admission_defaults.backoff_base_ms,
        )?,
        prefix_bytes: parse_usize(
            "LIVECHECK_PROBE_PREFIX_BYTES",
            admission_defaults.prefix_bytes,
        )?,
        user_agent: or_default("LIVECHECK_PROBE_USER_AGENT", &admission_defaults.user_agent),
        policy,
    };
    validate_bounds(
        "LIVECHECK_PROBE_MIN_CONCURRENCY",
        "LIVECHECK_PROBE_INITIAL_CONCURRENCY",
        "LIVECHECK_PROBE_MAX_CONCURRENCY",
        (
            admission.min_concurrency as u64,
            admission.initial_concurrency as u64,
            admission.max_concurrency as u64,
        ),
    )?;
    validate_bounds(
        "LIVECHECK_PROBE_MIN_TIMEOUT_SECS",
        "LIVECHECK_PROBE_INITIAL_TIMEOUT_SECS",
        "LIVECHECK_PROBE_MAX_TIMEOUT_SECS",
        (
            admission.min_timeout_secs,
            admission.initial_timeout_secs,
            admission.max_timeout_secs,
        ),
    )?;
    if admission.batch_size == 0 {
        return Err(invalid("LIVECHECK_PROBE_BATCH_SIZE", "must be at least 1"));
    }
    if admission.max_attempts == 0 {
        return Err(invalid("LIVECHECK_PROBE_MAX_ATTEMPTS", "must be at least 1"));
    }

    let deep_defaults = defaults.deep_probe;
    let deep_probe = DeepProbeConfig {
        concurrency: parse_usize("LIVECHECK_DEEP_CONCURRENCY", deep_defaults.concurrency)?
            .max(1),
        timeout_secs: parse_u64("LIVECHECK_DEEP_TIMEOUT_SECS", deep_defaults.timeout_secs)?,
        ffprobe_bin: or_default("LIVECHECK_FFPROBE_BIN", &deep_defaults.ffprobe_bin),
    };

    let fp_defaults = defaults.fingerprint;
    let frame_offsets_secs = match lookup("LIVECHECK_FRAME_OFFSETS") {
        Ok(raw) => parse_offsets(&raw)?,
        Err(_) => fp_defaults.frame_offsets_secs,
    };
    let fingerprint = FingerprintConfig {
        concurrency: parse_usize("LIVECHECK_FRAME_CONCURRENCY", fp_defaults.concurrency)?.max(1),
        timeout_secs: parse_u64("LIVECHECK_FRAME_TIMEOUT_SECS", fp_defaults.timeout_secs)?,
        frame_offsets_secs,
        ffmpeg_bin: or_default("LIVECHECK_FFMPEG_BIN", &fp_defaults.ffmpeg_bin),
        blank_luma_threshold: lookup("LIVECHECK_BLANK_LUMA_THRESHOLD").map_or(
            Ok(fp_defaults.blank_luma_threshold),
            |raw| parse_value("LIVECHECK_BLANK_LUMA_THRESHOLD", &raw),
        )?,
        static_similarity_threshold: parse_ratio(
            "LIVECHECK_STATIC_SIMILARITY_THRESHOLD",
            fp_defaults.static_similarity_threshold,
        )?,
        fake_similarity_threshold: parse_ratio(
            "LIVECHECK_FAKE_SIMILARITY_THRESHOLD",
            fp_defaults.fake_similarity_threshold,
        )?,
    };

    let shard_defaults = defaults.shard;
    let shard = ShardConfig {
        shard_size: parse_usize("LIVECHECK_SHARD_SIZE", shard_defaults.shard_size)?,
        parallelism: parse_usize("LIVECHECK_SHARD_PARALLELISM", shard_defaults.parallelism)?
            .max(1),
        stagger_secs: parse_u64("LIVECHECK_SHARD_STAGGER_SECS", shard_defaults.stagger_secs)?,
    };
    if shard.shard_size == 0 {
        return Err(invalid("LIVECHECK_SHARD_SIZE", "must be at least 1"));
    }

    Ok(AppConfig {
        log_level,
        cache_dir,
        timepoints,
        admission,
        deep_probe,
        fingerprint,
        shard,
    })
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

fn parse_offsets(raw: &str) -> Result<Vec<f64>, ConfigError> {
    const VAR: &str = "LIVECHECK_FRAME_OFFSETS";
    let offsets = split_list(raw)
        .iter()
        .map(|s| {
            s.parse::<f64>()
                .map_err(|e| invalid(VAR, format!("\"{s}\": {e}")))
                .and_then(|v| {
                    if v.is_finite() && v >= 0.0 {
                        Ok(v)
                    } else {
                        Err(invalid(VAR, format!("offset {v} must be >= 0")))
                    }
                })
        })
        .collect::<Result<Vec<f64>, ConfigError>>()?;
    if offsets.is_empty() {
        return Err(invalid(VAR, "at least one offset is required"));
    }
    Ok(offsets)
}

/// Checks `1 <= min <= initial <= max`.
fn validate_bounds(
    min_var: &str,
    initial_var: &str,
    max_var: &str,
    (min, initial, max): (u64, u64, u64),
) -> Result<(), ConfigError> {
    if min == 0 {
        return Err(invalid(min_var, "must be at least 1"));
    }
    if min > max {
        return Err(invalid(max_var, format!("{max} is below minimum {min}")));
    }
    if !(min..=max).contains(&initial) {
        return Err(invalid(
            initial_var,
            format!("{initial} is outside [{min}, {max}]"),
        ));
    }
    Ok(())
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
