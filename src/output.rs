use crate::error::Result;
use crate::sanity::Verdict;
use serde::Serialize;

pub fn output_data<T: Serialize>(data: &T, format: &str) -> Result<()> {
    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(data)?);
        }
        "yaml" => {
            println!("{}", serde_yaml::to_string(data)?);
        }
        "pretty" | _ => {
            println!("{}", serde_json::to_string_pretty(data)?);
        }
    }
    Ok(())
}

/// Verdicts as data, or one status line each in pretty mode
pub fn output_verdicts(verdicts: &[Verdict], format: &str) -> Result<()> {
    if format != "pretty" {
        return output_data(&verdicts, format);
    }
    for verdict in verdicts {
        match &verdict.failure {
            None => {
                let metrics: Vec<String> = verdict
                    .metrics
                    .iter()
                    .map(|m| format!("{}={} {}", m.key, m.value, m.unit))
                    .collect();
                if metrics.is_empty() {
                    print_success(&verdict.check);
                } else {
                    print_success(&format!("{} ({})", verdict.check, metrics.join(", ")));
                }
            }
            Some(failure) => {
                let mut line = format!("{}: {}: {}", verdict.check, failure.kind, failure.reason);
                if let Some(code) = verdict.exit_status.filter(|code| *code != 0) {
                    line.push_str(&format!(" (exit status {})", code));
                }
                print_failure(&line);
            }
        }
    }
    Ok(())
}

pub fn print_success(message: &str) {
    println!("✅ {}", message);
}

pub fn print_failure(message: &str) {
    println!("\x1b[31m❌ {}\x1b[0m", message);
}

pub fn print_error(message: &str) {
    eprintln!("\x1b[31m❌ Error: {}\x1b[0m", message);
}

pub fn print_warning(message: &str) {
    eprintln!("\x1b[33m⚠️  Warning: {}\x1b[0m", message);
}

pub fn print_info(message: &str) {
    println!("ℹ️  {}", message);
}
