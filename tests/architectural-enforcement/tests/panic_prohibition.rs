//! Integration Test: Unwrap Prohibition
//!
//! **Policy**: Production code propagates errors with `?` and typed errors.
//! `unwrap()` and `expect()` are reserved for tests.

use architectural_enforcement::{code_part, is_test_code, production_sources};

#[test]
fn test_no_unwrap_in_production_code() {
    let mut violations = Vec::new();

    for file in production_sources() {
        let lines = file.line_refs();
        for idx in find_unwraps(&lines) {
            violations.push(file.violation(idx, "Unwrap"));
        }
    }

    if !violations.is_empty() {
        eprintln!("\n❌ unwrap()/expect() found in production code!\n");
        for violation in &violations {
            eprintln!("  ❌ {}", violation);
        }
        eprintln!("\n✅ Use `?` with a typed error, or handle the None/Err case.");

        panic!(
            "\nFound {} unwrap violation(s) in production code.",
            violations.len()
        );
    }
}

fn find_unwraps(lines: &[&str]) -> Vec<usize> {
    lines
        .iter()
        .enumerate()
        .take_while(|(idx, _)| !is_test_code(lines, *idx))
        .filter(|(_, line)| {
            let code = code_part(line);
            code.contains(".unwrap()") || code.contains(".expect(")
        })
        .map(|(idx, _)| idx)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwrap_detected_outside_tests() {
        let code = vec![
            "fn parse(s: &str) -> u32 {",
            "    s.parse().unwrap()",
            "}",
            "fn fallback(s: &str) -> u32 {",
            "    s.parse().unwrap_or(0)",
            "}",
            "#[cfg(test)]",
            "mod tests {",
            "    fn t() { \"1\".parse::<u32>().unwrap(); }",
            "}",
        ];
        assert_eq!(find_unwraps(&code), vec![1]);
    }
}
