// src/policy.rs

//! Injected decision policies
//!
//! The engine never talks to a terminal. Wherever a human would be asked
//! something (which of several matches to use, whether to go ahead) the
//! caller supplies a policy. The non-interactive variants are the defaults;
//! `prompt::InteractivePrompt` plugs a terminal in through `Custom`.

use crate::error::{Error, Result};
use crate::kind::HolonKind;
use crate::manifest::Artifact;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// One candidate offered for disambiguation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub id: Uuid,
    pub name: String,
    pub kind: HolonKind,
    pub version: String,
    pub description: String,
}

impl From<&Artifact> for Candidate {
    fn from(artifact: &Artifact) -> Self {
        Self {
            id: artifact.id,
            name: artifact.name.clone(),
            kind: artifact.kind,
            version: artifact.version.clone(),
            description: artifact.description.clone(),
        }
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} v{} ({})", self.name, self.version, self.id)
    }
}

/// Answer of a disambiguator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// 1-based position in the candidate list
    Index(usize),
    Cancel,
}

/// Picks one of several candidates
pub trait Disambiguator: Send + Sync {
    fn choose(&self, token: &str, candidates: &[Candidate]) -> Result<Selection>;
}

/// Answers yes/no questions
pub trait Confirmer: Send + Sync {
    fn confirm(&self, question: &str) -> Result<bool>;
}

/// How to resolve an identifier that matches more than one holon
#[derive(Clone, Default)]
pub enum DisambiguationPolicy {
    /// Fail with `AmbiguousMatch` listing the candidates
    #[default]
    FailOnAmbiguity,
    SelectFirst,
    /// 1-based
    SelectIndex(usize),
    Custom(Arc<dyn Disambiguator>),
}

impl fmt::Debug for DisambiguationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FailOnAmbiguity => write!(f, "FailOnAmbiguity"),
            Self::SelectFirst => write!(f, "SelectFirst"),
            Self::SelectIndex(n) => write!(f, "SelectIndex({})", n),
            Self::Custom(_) => write!(f, "Custom"),
        }
    }
}

impl DisambiguationPolicy {
    /// 0-based index of the chosen candidate
    ///
    /// `candidates` must hold at least two entries; fewer never needs a choice.
    pub fn select(&self, token: &str, candidates: &[Candidate]) -> Result<usize> {
        let selection = match self {
            Self::FailOnAmbiguity => {
                return Err(Error::AmbiguousMatch {
                    token: token.to_string(),
                    candidates: candidates.iter().map(|c| c.name.clone()).collect(),
                });
            }
            Self::SelectFirst => Selection::Index(1),
            Self::SelectIndex(n) => Selection::Index(*n),
            Self::Custom(chooser) => chooser.choose(token, candidates)?,
        };

        match selection {
            Selection::Cancel => Err(Error::UserCancelled(format!(
                "no holon selected for '{}'",
                token
            ))),
            Selection::Index(n) if n >= 1 && n <= candidates.len() => Ok(n - 1),
            Selection::Index(n) => Err(Error::InvalidInput(format!(
                "selection {} is out of range 1..={} for '{}'",
                n,
                candidates.len(),
                token
            ))),
        }
    }
}

/// How to answer confirmation questions
#[derive(Clone, Default)]
pub enum ConfirmationPolicy {
    #[default]
    AutoConfirm,
    Decline,
    Custom(Arc<dyn Confirmer>),
}

impl fmt::Debug for ConfirmationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AutoConfirm => write!(f, "AutoConfirm"),
            Self::Decline => write!(f, "Decline"),
            Self::Custom(_) => write!(f, "Custom"),
        }
    }
}

impl ConfirmationPolicy {
    pub fn confirm(&self, question: &str) -> Result<bool> {
        match self {
            Self::AutoConfirm => Ok(true),
            Self::Decline => Ok(false),
            Self::Custom(confirmer) => confirmer.confirm(question),
        }
    }

    /// Confirm or fail with `UserCancelled`
    pub fn require(&self, question: &str) -> Result<()> {
        if self.confirm(question)? {
            Ok(())
        } else {
            Err(Error::UserCancelled(format!("declined: {}", question)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn candidates(names: &[&str]) -> Vec<Candidate> {
        names
            .iter()
            .map(|n| Candidate {
                id: Uuid::new_v4(),
                name: n.to_string(),
                kind: HolonKind::Library,
                version: "1.0.0".to_string(),
                description: String::new(),
            })
            .collect()
    }

    struct Always(Selection);

    impl Disambiguator for Always {
        fn choose(&self, _token: &str, _candidates: &[Candidate]) -> Result<Selection> {
            Ok(self.0)
        }
    }

    #[test]
    fn test_fail_on_ambiguity_lists_names() {
        let list = candidates(&["MoonBase", "Moonlight"]);
        match DisambiguationPolicy::FailOnAmbiguity.select("Moon", &list) {
            Err(Error::AmbiguousMatch { token, candidates }) => {
                assert_eq!(token, "Moon");
                assert_eq!(candidates, vec!["MoonBase", "Moonlight"]);
            }
            other => panic!("expected AmbiguousMatch, got {:?}", other),
        }
    }

    #[test]
    fn test_index_selection_is_one_based() {
        let list = candidates(&["A", "B", "C"]);
        assert_eq!(DisambiguationPolicy::SelectFirst.select("x", &list).unwrap(), 0);
        assert_eq!(DisambiguationPolicy::SelectIndex(3).select("x", &list).unwrap(), 2);
        assert_eq!(
            DisambiguationPolicy::SelectIndex(0)
                .select("x", &list)
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            DisambiguationPolicy::SelectIndex(4)
                .select("x", &list)
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidInput
        );
    }

    #[test]
    fn test_custom_cancel_is_user_cancelled() {
        let list = candidates(&["A", "B"]);
        let policy = DisambiguationPolicy::Custom(Arc::new(Always(Selection::Cancel)));
        assert_eq!(
            policy.select("x", &list).unwrap_err().kind(),
            ErrorKind::UserCancelled
        );
        let policy = DisambiguationPolicy::Custom(Arc::new(Always(Selection::Index(2))));
        assert_eq!(policy.select("x", &list).unwrap(), 1);
    }

    #[test]
    fn test_confirmation() {
        assert!(ConfirmationPolicy::AutoConfirm.confirm("go?").unwrap());
        assert!(!ConfirmationPolicy::Decline.confirm("go?").unwrap());
        assert_eq!(
            ConfirmationPolicy::Decline.require("go?").unwrap_err().kind(),
            ErrorKind::UserCancelled
        );
    }
}
