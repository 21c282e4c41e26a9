// src/bot/reveal_document.rs - Post body that carries the wheel game state
//
// Layout (0-based line numbers, after trimming the body):
//   0  intro
//   1  (blank)
//   2  revealed phrase, placeholder in unrevealed positions
//   3  (blank)
//   4  "<label>: <space separated missing letters>"
//   5.. free text, kept as is

use std::collections::BTreeSet;

use crate::bot::normalizer::normalize_char;
use crate::types::GameError;

pub const REVEALED_LINE: usize = 2;
pub const MISSING_LINE: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealDocument {
    lines: Vec<String>,
}

impl RevealDocument {
    pub fn parse(body: &str) -> Result<Self, GameError> {
        let lines: Vec<String> = body
            .trim()
            .split('\n')
            .map(|line| line.trim_end_matches('\r').to_string())
            .collect();

        if lines.len() <= MISSING_LINE {
            return Err(GameError::DocumentDrift(format!(
                "expected at least {} lines, found {}",
                MISSING_LINE + 1,
                lines.len()
            )));
        }
        if !lines[MISSING_LINE].contains(':') {
            return Err(GameError::DocumentDrift(format!(
                "line {} has no label: {:?}",
                MISSING_LINE, lines[MISSING_LINE]
            )));
        }
        Ok(Self { lines })
    }

    /// Body for a brand new game.
    pub fn render_new(intro: &str, masked: &str, missing_label: &str, rules: &str) -> String {
        format!("{}\n\n{}\n\n{}:\n\n{}\n", intro, masked, missing_label, rules)
    }

    pub fn revealed(&self) -> &str {
        &self.lines[REVEALED_LINE]
    }

    pub fn missing_label(&self) -> &str {
        self.lines[MISSING_LINE].split(':').next().unwrap_or_default()
    }

    pub fn missing(&self) -> BTreeSet<char> {
        self.lines[MISSING_LINE]
            .splitn(2, ':')
            .nth(1)
            .unwrap_or_default()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect()
    }

    pub fn with_progress(&self, revealed: &str, missing: &BTreeSet<char>) -> String {
        let letters: Vec<String> = missing.iter().map(char::to_string).collect();
        let label = format!("{}: {}", self.missing_label(), letters.join(" "));
        self.render(revealed.to_string(), label.trim_end().to_string())
    }

    pub fn with_solution(&self, solution: &str, solved_label: &str, winner: &str) -> String {
        self.render(solution.to_string(), format!("{}: u/{}", solved_label, winner))
    }

    fn render(&self, revealed: String, missing_line: String) -> String {
        let mut lines = self.lines.clone();
        lines[REVEALED_LINE] = revealed;
        lines[MISSING_LINE] = missing_line;
        lines.join("\n")
    }
}

/// Hide every alphabet letter of the solution behind `placeholder`.
pub fn mask(solution: &str, alphabet: &str, placeholder: char) -> String {
    solution
        .chars()
        .map(|c| if is_in_alphabet(c, alphabet) { placeholder } else { c })
        .collect()
}

pub fn is_in_alphabet(c: char, alphabet: &str) -> bool {
    c.to_uppercase().all(|u| alphabet.contains(u))
}

/// Uncover every solution position whose normalized letter is in `letters`.
/// Positions already uncovered stay uncovered.
pub fn overlay(solution: &str, current: &str, letters: &BTreeSet<String>) -> String {
    solution
        .chars()
        .zip(current.chars())
        .map(|(target, shown)| if letters.contains(&normalize_char(target)) { target } else { shown })
        .collect()
}

/// Lengths of the words of the solution, counted in alphabet letters.
pub fn word_lengths(solution: &str, alphabet: &str) -> Vec<usize> {
    let mut lengths = Vec::new();
    let mut run = 0;
    for c in solution.chars() {
        if is_in_alphabet(c, alphabet) {
            run += 1;
        } else if run > 0 {
            lengths.push(run);
            run = 0;
        }
    }
    if run > 0 {
        lengths.push(run);
    }
    lengths
}
