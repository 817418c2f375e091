//! `searchbridge config` subcommands.

use sb_domain::config::{Config, ConfigSeverity};

/// Report validation issues; returns false when any error is present.
pub fn validate(config: &Config) -> bool {
    let issues = config.validate();
    if issues.is_empty() {
        println!("Configuration is valid.");
        return true;
    }
    let mut valid = true;
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => println!("warning: {issue}"),
            ConfigSeverity::Error => {
                println!("error: {issue}");
                valid = false;
            }
        }
    }
    valid
}

/// Dump the resolved configuration (defaults included) as TOML.
pub fn show(config: &Config) {
    match toml::to_string_pretty(config) {
        Ok(rendered) => print!("{rendered}"),
        Err(err) => println!("cannot render config: {err}"),
    }
}
