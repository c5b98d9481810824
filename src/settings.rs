//! 環境變數配置
//!
//! `STOW_*` 變數覆寫 [`AllocationConfig`] 的預設值；無法解析或不合法的值
//! 記錄警告後沿用預設值。

use std::env;

use stow_core::{AllocationConfig, SubstitutionRule};

pub const MAX_WEIGHT_VAR: &str = "STOW_MAX_WEIGHT";
pub const MAX_UNITS_VAR: &str = "STOW_MAX_UNITS";
pub const EPSILON_VAR: &str = "STOW_EPSILON";
pub const FILL_LIMIT_VAR: &str = "STOW_FILL_LIMIT";
pub const DOMINANT_THRESHOLD_VAR: &str = "STOW_DOMINANT_THRESHOLD";
pub const WASTE_THRESHOLD_VAR: &str = "STOW_WASTE_THRESHOLD";
pub const MAX_DEFRAG_ITERATIONS_VAR: &str = "STOW_MAX_DEFRAG_ITERATIONS";
pub const MAX_RESOLUTION_PASSES_VAR: &str = "STOW_MAX_RESOLUTION_PASSES";
pub const DEFRAGMENT_VAR: &str = "STOW_DEFRAGMENT";
pub const SUBSTITUTION_VAR: &str = "STOW_SUBSTITUTION";

/// 從目前的環境變數讀取配置
pub fn config_from_env() -> AllocationConfig {
    config_from_lookup(env_string)
}

/// 從任意來源讀取配置
pub fn config_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AllocationConfig {
    let defaults = AllocationConfig::default();

    let max_weight = load_f64_with_warning(
        &lookup,
        MAX_WEIGHT_VAR,
        defaults.max_weight,
        |value| value > 0.0,
        "必須大於 0",
    );
    let max_units = load_f64_with_warning(
        &lookup,
        MAX_UNITS_VAR,
        defaults.max_units,
        |value| value >= 1.0,
        "至少為 1",
    );
    let epsilon = load_f64_with_warning(
        &lookup,
        EPSILON_VAR,
        defaults.epsilon,
        |value| value > 0.0 && value < 0.01,
        "必須介於 0 與 0.01",
    );
    let fill_limit = load_f64_with_warning(
        &lookup,
        FILL_LIMIT_VAR,
        defaults.fill_limit,
        |value| value > 0.0 && value < 1.0,
        "必須介於 0 與 1",
    );
    let dominant_threshold = load_f64_with_warning(
        &lookup,
        DOMINANT_THRESHOLD_VAR,
        defaults.dominant_threshold,
        |value| value > 0.0 && value <= 1.0,
        "必須介於 0 與 1",
    );
    let waste_threshold = load_f64_with_warning(
        &lookup,
        WASTE_THRESHOLD_VAR,
        defaults.waste_threshold,
        |value| (0.0..=1.0).contains(&value),
        "必須介於 0 與 1",
    );
    let max_defrag_iterations = load_u32_with_warning(
        &lookup,
        MAX_DEFRAG_ITERATIONS_VAR,
        defaults.max_defrag_iterations,
    );
    let max_resolution_passes = load_u32_with_warning(
        &lookup,
        MAX_RESOLUTION_PASSES_VAR,
        defaults.max_resolution_passes,
    );
    let defragment = lookup(DEFRAGMENT_VAR)
        .and_then(|raw| parse_bool(&raw, DEFRAGMENT_VAR))
        .unwrap_or(defaults.defragment);
    let substitution = lookup(SUBSTITUTION_VAR)
        .and_then(|raw| parse_substitution(&raw))
        .unwrap_or(defaults.substitution);

    AllocationConfig::new()
        .with_max_weight(max_weight)
        .with_max_units(max_units)
        .with_epsilon(epsilon)
        .with_fill_limit(fill_limit)
        .with_dominant_threshold(dominant_threshold)
        .with_waste_threshold(waste_threshold)
        .with_max_defrag_iterations(max_defrag_iterations)
        .with_max_resolution_passes(max_resolution_passes)
        .with_defragment(defragment)
        .with_substitution(substitution)
}

fn env_string(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_owned())
            }
        }
        Err(env::VarError::NotPresent) => None,
        Err(err) => {
            tracing::warn!("讀取 {} 失敗: {}，使用預設值", name, err);
            None
        }
    }
}

fn parse_bool(raw: &str, var_name: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        other => {
            tracing::warn!("{} 無法解讀為布林值 ('{}')，使用預設值", var_name, other);
            None
        }
    }
}

fn parse_substitution(raw: &str) -> Option<SubstitutionRule> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "lighter-group" | "lighter_group" | "lightergroup" => Some(SubstitutionRule::LighterGroup),
        "disabled" | "off" | "none" => Some(SubstitutionRule::Disabled),
        other => {
            tracing::warn!("{} 不是已知的替代規則 ('{}')，使用預設值", SUBSTITUTION_VAR, other);
            None
        }
    }
}

fn load_f64_with_warning(
    lookup: &impl Fn(&str) -> Option<String>,
    var_name: &str,
    default: f64,
    validator: impl Fn(f64) -> bool,
    invalid_hint: &str,
) -> f64 {
    let Some(raw) = lookup(var_name) else {
        return default;
    };
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() && validator(value) => {
            if (value - default).abs() > default.abs().max(1.0) * 1e-9 {
                tracing::info!("{} 覆寫為 {}", var_name, value);
            }
            value
        }
        Ok(_) => {
            tracing::warn!(
                "{} 的值 '{}' 不合法: {}，使用 {}",
                var_name,
                raw,
                invalid_hint,
                default
            );
            default
        }
        Err(err) => {
            tracing::warn!("{} ('{}') 無法解析為數字: {}，使用 {}", var_name, raw, err, default);
            default
        }
    }
}

fn load_u32_with_warning(
    lookup: &impl Fn(&str) -> Option<String>,
    var_name: &str,
    default: u32,
) -> u32 {
    let Some(raw) = lookup(var_name) else {
        return default;
    };
    match raw.parse::<u32>() {
        Ok(value) if value > 0 => value,
        Ok(_) => {
            tracing::warn!("{} 不可為 0，使用 {}", var_name, default);
            default
        }
        Err(err) => {
            tracing::warn!("{} ('{}') 無法解析為正整數: {}，使用 {}", var_name, raw, err, default);
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[rstest]
    #[case("1", Some(true))]
    #[case("TRUE", Some(true))]
    #[case("on", Some(true))]
    #[case("no", Some(false))]
    #[case("0", Some(false))]
    #[case("maybe", None)]
    fn test_parse_bool(#[case] raw: &str, #[case] expected: Option<bool>) {
        assert_eq!(parse_bool(raw, "TEST_VAR"), expected);
    }

    #[test]
    fn test_defaults_without_variables() {
        let config = config_from_lookup(|_| None);
        assert_eq!(config, AllocationConfig::default());
    }

    #[test]
    fn test_overrides_applied() {
        let config = config_from_lookup(lookup_from(&[
            (MAX_WEIGHT_VAR, "20000"),
            (FILL_LIMIT_VAR, "0.8"),
            (MAX_RESOLUTION_PASSES_VAR, "10"),
            (DEFRAGMENT_VAR, "off"),
            (SUBSTITUTION_VAR, "disabled"),
        ]));

        assert_eq!(config.max_weight, 20_000.0);
        assert_eq!(config.fill_limit, 0.8);
        assert_eq!(config.max_resolution_passes, 10);
        assert!(!config.defragment);
        assert_eq!(config.substitution, SubstitutionRule::Disabled);
        assert!(config.validate().is_ok());
    }

    #[rstest]
    #[case(MAX_WEIGHT_VAR, "-5")]
    #[case(MAX_WEIGHT_VAR, "heavy")]
    #[case(FILL_LIMIT_VAR, "1.5")]
    #[case(EPSILON_VAR, "0")]
    #[case(MAX_DEFRAG_ITERATIONS_VAR, "0")]
    #[case(SUBSTITUTION_VAR, "random")]
    fn test_invalid_values_fall_back(#[case] var: &str, #[case] raw: &str) {
        let config = config_from_lookup(lookup_from(&[(var, raw)]));
        assert_eq!(config, AllocationConfig::default());
    }
}
