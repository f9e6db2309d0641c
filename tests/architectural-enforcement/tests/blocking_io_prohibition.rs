//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Async code in the chatstream crates MUST NOT block the runtime.
//! **Required**: `tokio::fs`, `tokio::net`, `tokio::io`, async `reqwest`
//!
//! Plain (sync) functions may block; they run before the runtime starts or
//! only read small config files.

use architectural_enforcement::{
    code_part, is_in_async_function, is_in_non_async_function, is_test_code,
    production_sources, SourceFile,
};

#[test]
fn test_no_blocking_io_in_production_code() {
    let violations: Vec<String> = production_sources().iter().flat_map(scan).collect();

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Blocking I/O calls found in production code!\n");
        for violation in &violations {
            eprintln!("  ❌ {}", violation);
        }

        eprintln!("\n❌ FORBIDDEN in async code:");
        eprintln!("  - std::fs::*, std::net::*");
        eprintln!("  - std::io::stdin(), std::io::stdout()");
        eprintln!("  - std::thread::sleep()");
        eprintln!("  - reqwest::blocking::* (anywhere)");
        eprintln!("\n✅ REQUIRED:");
        eprintln!("  - tokio::fs, tokio::net, tokio::io::stdin()/stdout()");
        eprintln!("  - reqwest::Client with .await");

        panic!(
            "\nFound {} blocking I/O violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}

fn scan(file: &SourceFile) -> Vec<String> {
    let lines = file.line_refs();
    scan_lines(&lines)
        .into_iter()
        .map(|(idx, kind)| file.violation(idx, kind))
        .collect()
}

/// (line index, violation kind) for every blocking call in `lines`
fn scan_lines(lines: &[&str]) -> Vec<(usize, &'static str)> {
    let mut found = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        if is_test_code(lines, idx) {
            break;
        }
        let code = code_part(line);

        if code.contains("reqwest::blocking") {
            found.push((idx, "Blocking HTTP client"));
            continue;
        }

        // Imports make the blocking API available everywhere in the file
        let is_import = code.trim_start().starts_with("use ");
        if is_import && (code.contains("std::fs") || code.contains("std::net")) {
            found.push((idx, "Blocking I/O import"));
            continue;
        }

        if is_in_non_async_function(lines, idx) || !is_in_async_function(lines, idx) {
            continue;
        }

        if code.contains("std::fs::") {
            found.push((idx, "Blocking file I/O in async"));
        }
        if code.contains("std::net::") {
            found.push((idx, "Blocking network I/O in async"));
        }
        if code.contains("std::io::stdin()") || code.contains("std::io::stdout()") {
            found.push((idx, "Blocking stdin/stdout in async"));
        }
        if code.contains("std::thread::sleep") {
            found.push((idx, "Thread sleep in async"));
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocking_read_in_async_detected() {
        let code = vec![
            "async fn load() {",
            "    let text = std::fs::read_to_string(\"client.toml\");",
            "}",
        ];
        assert_eq!(scan_lines(&code), vec![(1, "Blocking file I/O in async")]);
    }

    #[test]
    fn test_blocking_read_in_sync_allowed() {
        let code = vec![
            "pub fn load_config() {",
            "    let text = std::fs::read_to_string(\"client.toml\");",
            "}",
        ];
        assert!(scan_lines(&code).is_empty());
    }

    #[test]
    fn test_blocking_client_always_detected() {
        let code = vec!["fn fetch() {", "    reqwest::blocking::get(url);", "}"];
        assert_eq!(scan_lines(&code), vec![(1, "Blocking HTTP client")]);
    }

    #[test]
    fn test_test_module_ignored() {
        let code = vec![
            "#[cfg(test)]",
            "mod tests {",
            "    async fn fixture() { std::fs::write(\"x\", \"y\"); }",
            "}",
        ];
        assert!(scan_lines(&code).is_empty());
    }
}
