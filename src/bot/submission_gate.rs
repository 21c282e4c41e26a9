// src/bot/submission_gate.rs - Opening and closing the community to new
// questions through its automoderator rules

/// Whether new questions are let through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Open,
    Closed,
}

impl Gate {
    /// Wiki revision reason.
    pub fn reason(&self) -> &'static str {
        match self {
            Gate::Open => "Opening",
            Gate::Closed => "Closing",
        }
    }
}

/// Rewrite the rules so the one marked by `marker` matches `gate`.
///
/// The `name:` condition sits on the line right before the marker: the
/// community is open while it reads ` name:` and closed once it is negated
/// to ` ~name:`. Returns `None` when no line after the first carries the
/// marker. Setting the current state again returns the rules unchanged.
pub fn set_gate(rules: &str, marker: &str, gate: Gate) -> Option<String> {
    let mut lines: Vec<String> = rules.split('\n').map(str::to_string).collect();
    let at = lines.iter().position(|line| line.contains(marker))?;
    let condition = at.checked_sub(1)?;

    lines[condition] = match gate {
        Gate::Open => lines[condition].replace("~name:", "name:"),
        Gate::Closed => lines[condition].replace(" name:", " ~name:"),
    };
    Some(lines.join("\n"))
}
