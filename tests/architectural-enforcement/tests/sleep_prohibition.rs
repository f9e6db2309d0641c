//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code MUST NOT sleep. Waiting is done on I/O,
//! channels, or `tokio::time::timeout` around a real future.
//! **Exceptions**: test code

use architectural_enforcement::{code_part, is_test_code, production_sources};

#[test]
fn test_no_sleep_in_production_code() {
    let mut violations = Vec::new();

    for file in production_sources() {
        let lines = file.line_refs();
        for idx in find_sleeps(&lines) {
            violations.push(file.violation(idx, "Sleep"));
        }
    }

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Sleep calls found in production code!\n");
        for violation in &violations {
            eprintln!("  ❌ {}", violation);
        }

        eprintln!("\n✅ ACCEPTABLE:");
        eprintln!("  - tokio::time::timeout() around the awaited I/O");
        eprintln!("  - Test code (#[cfg(test)] modules, tests/ directories)");
        eprintln!("\n❌ FORBIDDEN:");
        eprintln!("  - Sleep in polling loops");
        eprintln!("  - Sleep as poor man's synchronization");

        panic!(
            "\nFound {} sleep violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}

fn find_sleeps(lines: &[&str]) -> Vec<usize> {
    lines
        .iter()
        .enumerate()
        .take_while(|(idx, _)| !is_test_code(lines, *idx))
        .filter(|(_, line)| {
            let code = code_part(line);
            code.contains("::sleep(") || code.contains(".sleep(") || code.contains("sleep_until(")
        })
        .map(|(idx, _)| idx)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sleep_detected() {
        let code = vec![
            "async fn poll() {",
            "    tokio::time::sleep(Duration::from_millis(10)).await;",
            "}",
        ];
        assert_eq!(find_sleeps(&code), vec![1]);
    }

    #[test]
    fn test_comment_and_test_module_ignored() {
        let code = vec![
            "// never tokio::time::sleep(d) here",
            "#[cfg(test)]",
            "mod tests {",
            "    async fn t() { tokio::time::sleep(d).await; }",
            "}",
        ];
        assert!(find_sleeps(&code).is_empty());
    }
}
