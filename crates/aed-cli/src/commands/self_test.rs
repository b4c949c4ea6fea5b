//! `audio-entropyd self-test <file>`: offline NIST SP 800-22-flavored
//! battery over a captured raw-output file, via the `aed-diagnostics`
//! crate. Distinct from, and more extensive than, the FIPS 140-2 four-test
//! monitor the daemon runs inline on its hot path.

use std::fs;
use std::process::ExitCode;

pub fn run(path: &str, output: Option<&str>) -> ExitCode {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("couldn't read '{path}': {e}");
            return ExitCode::FAILURE;
        }
    };

    if data.is_empty() {
        eprintln!("'{path}' is empty; nothing to test");
        return ExitCode::FAILURE;
    }

    let results = aed_diagnostics::run_all_tests(&data);
    let score = aed_diagnostics::calculate_quality_score(&results);

    for result in &results {
        let p = result
            .p_value
            .map(|p| format!("{p:.4}"))
            .unwrap_or_else(|| "n/a".to_string());
        println!(
            "[{}] {:<28} p={p:<8} grade={} {}",
            if result.passed { "PASS" } else { "FAIL" },
            result.name,
            result.grade,
            result.details,
        );
    }
    println!("\noverall quality score: {score:.1}/100 ({} bytes tested)", data.len());

    if let Some(output_path) = output {
        let report: String = results
            .iter()
            .map(|r| {
                format!(
                    "{}\t{}\t{:?}\t{}\t{}\n",
                    r.name, r.passed, r.p_value, r.grade, r.details
                )
            })
            .collect();
        if let Err(e) = fs::write(output_path, report) {
            eprintln!("failed to write report to '{output_path}': {e}");
            return ExitCode::FAILURE;
        }
    }

    let failures = results.iter().filter(|r| !r.passed).count();
    if failures > results.len() / 2 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
