// # Interactive prompts
//
// Firewall selection during `fwsync init` runs as a small state machine:
//
// ```text
//   Prompting ──valid index──▶ Confirming ──Y/y/yes/<enter>──▶ Accepted
//       ▲                          │
//       └────────── Retry ◀────────┘ anything else
// ```
//
// An unparsable or out-of-range index stays in Prompting. Reader and writer
// are generic so the flow can be driven from tests.

use fwsync_core::engine::FirewallSelector;
use fwsync_core::traits::Firewall;
use fwsync_core::{Error, Result};
use std::io::{BufRead, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SelectionState {
    Prompting,
    Confirming(usize),
    Accepted(usize),
    Retry,
}

/// Terminal prompt over any reader/writer pair
pub struct Prompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Print `prompt` and read one trimmed line; `None` once input is closed
    fn ask(&mut self, prompt: &str) -> std::io::Result<Option<String>> {
        write!(self.output, "{}", prompt)?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    /// Ask whether an existing record may be replaced
    ///
    /// Unrecognized answers repeat the question. Closed input counts as no.
    pub fn confirm_overwrite(&mut self) -> std::io::Result<bool> {
        loop {
            match self.ask("Existing configuration file detected. Continue anyway? [Y/n]: ")? {
                None => return Ok(false),
                Some(answer) => match answer.as_str() {
                    "Y" | "y" | "yes" | "" => return Ok(true),
                    "N" | "n" | "no" => return Ok(false),
                    _ => {}
                },
            }
        }
    }

    fn step(&mut self, state: SelectionState, firewalls: &[Firewall]) -> Result<SelectionState> {
        let closed = || Error::invalid_input("input closed before a firewall was selected");

        match state {
            SelectionState::Prompting | SelectionState::Retry => {
                let prompt = format!("Select Firewall to use 0-{}: ", firewalls.len() - 1);
                let answer = self.ask(&prompt)?.ok_or_else(closed)?;
                Ok(match answer.parse::<usize>() {
                    Ok(idx) if idx < firewalls.len() => SelectionState::Confirming(idx),
                    _ => SelectionState::Prompting,
                })
            }
            SelectionState::Confirming(idx) => {
                let prompt = format!(
                    "You've selected {}, is that correct? [Y/n]: ",
                    firewalls[idx].name
                );
                let answer = self.ask(&prompt)?.ok_or_else(closed)?;
                Ok(match answer.as_str() {
                    "Y" | "y" | "yes" | "" => SelectionState::Accepted(idx),
                    _ => SelectionState::Retry,
                })
            }
            SelectionState::Accepted(_) => Ok(state),
        }
    }
}

impl<R: BufRead, W: Write> FirewallSelector for Prompter<R, W> {
    fn select(&mut self, firewalls: &[Firewall]) -> Result<usize> {
        if firewalls.is_empty() {
            return Err(Error::not_found("no firewalls to select from"));
        }

        for (idx, fw) in firewalls.iter().enumerate() {
            writeln!(self.output, "{}:\t{}", idx, fw.name)?;
        }

        let mut state = SelectionState::Prompting;
        loop {
            state = self.step(state, firewalls)?;
            tracing::trace!("selection state: {:?}", state);
            if let SelectionState::Accepted(idx) = state {
                return Ok(idx);
            }
        }
    }

    fn not_found(&mut self, name: &str) {
        if let Err(e) = writeln!(
            self.output,
            "Firewall {} no longer exists, please select another.",
            name
        ) {
            tracing::warn!("Failed to write selection notice: {}", e);
        }
    }
}
