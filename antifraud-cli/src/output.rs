//! Terminal output formatting.

use antifraud_validator::FinalDecision;
use colored::Colorize;

/// Print a success message.
pub fn success(msg: &str) {
    println!("{} {}", "✓".green().bold(), msg.green());
}

/// Print an error message.
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red().bold(), msg.red());
}

/// Print an info message.
pub fn info(msg: &str) {
    println!("{} {}", "→".cyan(), msg);
}

/// Print a warning message.
pub fn warn(msg: &str) {
    println!("{} {}", "!".yellow().bold(), msg.yellow());
}

/// Print a header.
pub fn header(msg: &str) {
    println!("\n{}", msg.white().bold());
    println!("{}", "─".repeat(msg.chars().count()).dimmed());
}

/// Print a key-value pair.
pub fn kv(key: &str, value: &str) {
    println!("  {} {}", format!("{}:", key).dimmed(), value);
}

/// Print a helpful hint.
pub fn hint(msg: &str) {
    println!("{} {}", "💡".dimmed(), msg.dimmed());
}

/// Print a final decision.
pub fn decision(result: &FinalDecision) {
    header("Antifraud Decision");
    println!();
    if result.is_approved() {
        success(&format!("Approved (score {:.1}%)", result.score * 100.0));
    } else {
        // Rejection is a verdict, not a failure of the command.
        println!(
            "{} {}",
            "✗".red().bold(),
            format!("Rejected (score {:.1}%)", result.score * 100.0).red()
        );
    }

    kv("Threshold", &format!("{:.0}%", result.threshold * 100.0));
    kv("Mode", &result.policy.mode.to_string());
    kv(
        "Model",
        &format!("{} ({} models)", result.model_version, result.model_count),
    );
    kv("Signals", &result.signals.join(", "));
    kv("Reason", &result.reason);

    if let Some(mesh) = &result.mesh {
        let score = mesh
            .score
            .map(|s| format!("{:.1}%", s * 100.0))
            .unwrap_or_else(|| "n/a".to_string());
        kv(
            "Mesh",
            &format!("{} (score {}, {} participants)", mesh.decision, score, mesh.participants),
        );
        if !mesh.discrepancies.is_empty() {
            let flags: Vec<String> = mesh.discrepancies.iter().map(|d| d.to_string()).collect();
            warn(&format!("Mesh discrepancies: {}", flags.join(", ")));
        }
    }
    println!();
}
