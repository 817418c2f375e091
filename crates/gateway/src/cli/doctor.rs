//! `searchbridge doctor`: diagnostic checks against the resolved config.

use std::path::Path;
use std::time::Duration;

use sb_domain::config::{Config, ConfigSeverity};
use sb_feed::FEED_PORT;

/// Run all diagnostic checks and print a summary.
///
/// Returns `Ok(true)` when every check passes, `Ok(false)` when at least
/// one check failed.
pub async fn run(config: &Config, config_path: &Path) -> anyhow::Result<bool> {
    println!("searchbridge doctor");
    println!("===================\n");

    let mut all_passed = true;

    check_config_file(config_path, &mut all_passed);
    check_config_validation(config, &mut all_passed);
    check_indexer(config, &mut all_passed).await;
    check_content_root(config, &mut all_passed);
    check_tls(config, &mut all_passed);

    println!();
    if all_passed {
        println!("All checks passed.");
    } else {
        println!("Some checks failed. Review the output above.");
    }

    Ok(all_passed)
}

// ── Individual checks ─────────────────────────────────────────────────

fn check_config_file(config_path: &Path, all_passed: &mut bool) {
    let exists = config_path.exists();
    print_check(
        "Config file exists",
        exists,
        if exists {
            config_path.display().to_string()
        } else {
            format!("{} not found (using defaults)", config_path.display())
        },
    );
    if !exists {
        *all_passed = false;
    }
}

fn check_config_validation(config: &Config, all_passed: &mut bool) {
    let issues = config.validate();
    let error_count = issues
        .iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .count();

    if issues.is_empty() {
        print_check("Config validation", true, "no issues".into());
    } else {
        print_check(
            "Config validation",
            error_count == 0,
            format!("{} issue(s), {error_count} error(s)", issues.len()),
        );
        for issue in &issues {
            println!("      - {issue}");
        }
        if error_count > 0 {
            *all_passed = false;
        }
    }
}

async fn check_indexer(config: &Config, all_passed: &mut bool) {
    let Some(host) = config.gsa.hostname.as_deref() else {
        print_check("Indexer reachable", false, "gsa.hostname not set".into());
        *all_passed = false;
        return;
    };
    let target = format!("{host}:{FEED_PORT}");
    let reachable = tokio::time::timeout(
        Duration::from_secs(3),
        tokio::net::TcpStream::connect(&target),
    )
    .await
    .map(|r| r.is_ok())
    .unwrap_or(false);
    print_check(
        "Indexer reachable",
        reachable,
        if reachable {
            target
        } else {
            format!("cannot open a TCP connection to {target}")
        },
    );
    if !reachable {
        *all_passed = false;
    }
}

fn check_content_root(config: &Config, all_passed: &mut bool) {
    let root = &config.adaptor.content_root;
    let exists = root.is_dir();
    print_check(
        "Content root exists",
        exists,
        root.display().to_string(),
    );
    if !exists {
        *all_passed = false;
    }
}

fn check_tls(config: &Config, all_passed: &mut bool) {
    if !config.server.secure {
        print_check("TLS material", true, "server.secure = false".into());
        return;
    }
    let cert_ok = config
        .server
        .tls_certificate
        .as_deref()
        .is_some_and(Path::exists);
    let key_ok = config
        .server
        .tls_private_key
        .as_deref()
        .is_some_and(Path::exists);
    print_check(
        "TLS material",
        cert_ok && key_ok,
        if cert_ok && key_ok {
            "certificate and key found".into()
        } else {
            "missing certificate or key file".into()
        },
    );
    if !(cert_ok && key_ok) {
        *all_passed = false;
    }
}

fn print_check(name: &str, passed: bool, detail: String) {
    let mark = if passed { "ok " } else { "FAIL" };
    println!("[{mark}] {name}: {detail}");
}
