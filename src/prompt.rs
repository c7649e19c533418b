// src/prompt.rs

//! Terminal prompts for disambiguation and confirmation
//!
//! Adapts a line-oriented reader/writer pair (stdin/stdout by default) to
//! the [`Disambiguator`] and [`Confirmer`] policies. Only the CLI uses this;
//! the engine sees nothing but the policy traits.

use crate::error::{Error, Result};
use crate::policy::{Candidate, Confirmer, Disambiguator, Selection};
use std::io::{self, BufRead, IsTerminal, Write};
use std::sync::Mutex;

/// Invalid answers tolerated before giving up
const MAX_ATTEMPTS: usize = 3;

/// Prompt over a reader/writer pair
pub struct InteractivePrompt {
    input: Mutex<Box<dyn BufRead + Send>>,
    output: Mutex<Box<dyn Write + Send>>,
}

impl InteractivePrompt {
    /// Prompt on the process's stdin/stdout
    pub fn stdio() -> Self {
        Self::with_io(io::BufReader::new(io::stdin()), io::stdout())
    }

    /// Prompt over arbitrary streams
    pub fn with_io(input: impl BufRead + Send + 'static, output: impl Write + Send + 'static) -> Self {
        Self {
            input: Mutex::new(Box::new(input)),
            output: Mutex::new(Box::new(output)),
        }
    }

    /// Whether stdin is attached to a terminal
    pub fn stdin_is_terminal() -> bool {
        io::stdin().is_terminal()
    }

    fn poisoned() -> Error {
        Error::Io(io::Error::other("prompt stream lock poisoned"))
    }

    fn write(&self, text: &str) -> Result<()> {
        let mut output = self.output.lock().map_err(|_| Self::poisoned())?;
        write!(output, "{}", text)?;
        output.flush()?;
        Ok(())
    }

    /// One trimmed line, or None at end of input
    fn read_line(&self) -> Result<Option<String>> {
        let mut input = self.input.lock().map_err(|_| Self::poisoned())?;
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }
}

impl Disambiguator for InteractivePrompt {
    fn choose(&self, token: &str, candidates: &[Candidate]) -> Result<Selection> {
        let mut listing = format!("\n'{}' matches {} holons:\n", token, candidates.len());
        for (i, candidate) in candidates.iter().enumerate() {
            listing.push_str(&format!("  [{}] {}\n", i + 1, candidate));
            if !candidate.description.is_empty() {
                listing.push_str(&format!("      {}\n", candidate.description));
            }
        }
        self.write(&listing)?;

        for _ in 0..MAX_ATTEMPTS {
            self.write(&format!("Select [1-{}] or 'c' to cancel: ", candidates.len()))?;
            let Some(answer) = self.read_line()? else {
                return Ok(Selection::Cancel);
            };
            match answer.to_lowercase().as_str() {
                "" | "c" | "cancel" | "q" | "quit" => return Ok(Selection::Cancel),
                other => match other.parse::<usize>() {
                    Ok(n) if n >= 1 && n <= candidates.len() => return Ok(Selection::Index(n)),
                    _ => self.write("Invalid selection.\n")?,
                },
            }
        }

        Ok(Selection::Cancel)
    }
}

impl Confirmer for InteractivePrompt {
    fn confirm(&self, question: &str) -> Result<bool> {
        self.write(&format!("{} [y/N]: ", question))?;
        let answer = self.read_line()?.unwrap_or_default();
        Ok(matches!(answer.to_lowercase().as_str(), "y" | "yes"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::HolonKind;
    use std::io::Cursor;
    use uuid::Uuid;

    fn prompt(answers: &str) -> InteractivePrompt {
        InteractivePrompt::with_io(Cursor::new(answers.as_bytes().to_vec()), io::sink())
    }

    fn candidates() -> Vec<Candidate> {
        ["MoonBase", "Moonlight"]
            .iter()
            .map(|n| Candidate {
                id: Uuid::new_v4(),
                name: n.to_string(),
                kind: HolonKind::CelestialBody,
                version: "1.0.0".to_string(),
                description: "a moon".to_string(),
            })
            .collect()
    }

    #[test]
    fn test_choose_by_number() {
        let selection = prompt("2\n").choose("Moon", &candidates()).unwrap();
        assert_eq!(selection, Selection::Index(2));
    }

    #[test]
    fn test_invalid_then_valid() {
        let selection = prompt("9\nabc\n1\n").choose("Moon", &candidates()).unwrap();
        assert_eq!(selection, Selection::Index(1));
    }

    #[test]
    fn test_cancel_and_eof() {
        assert_eq!(
            prompt("c\n").choose("Moon", &candidates()).unwrap(),
            Selection::Cancel
        );
        assert_eq!(
            prompt("").choose("Moon", &candidates()).unwrap(),
            Selection::Cancel
        );
        assert_eq!(
            prompt("7\n8\n9\n1\n").choose("Moon", &candidates()).unwrap(),
            Selection::Cancel
        );
    }

    #[test]
    fn test_confirm() {
        assert!(prompt("y\n").confirm("Remove?").unwrap());
        assert!(prompt("YES\n").confirm("Remove?").unwrap());
        assert!(!prompt("n\n").confirm("Remove?").unwrap());
        assert!(!prompt("").confirm("Remove?").unwrap());
    }
}
