use crate::error::NetForgeError;

/// Input/output count constraints of a node kind.
///
/// Unset bounds are unconstrained. Kinds with `auto_outputs` get anonymous
/// outputs appended until `max(min_outputs, exact_outputs)` is reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Arity {
    pub exact_inputs: Option<usize>,
    pub min_inputs: Option<usize>,
    pub max_inputs: Option<usize>,
    pub exact_outputs: Option<usize>,
    pub min_outputs: Option<usize>,
    pub max_outputs: Option<usize>,
    pub auto_outputs: bool,
}

impl Arity {
    pub fn exact(inputs: usize, outputs: usize) -> Self {
        Arity {
            exact_inputs: Some(inputs),
            exact_outputs: Some(outputs),
            ..Default::default()
        }
    }

    pub fn with_auto_outputs(mut self) -> Self {
        self.auto_outputs = true;
        self
    }

    /// Number of anonymous outputs to add to `declared` outputs.
    pub fn missing_outputs(&self, declared: usize) -> usize {
        if !self.auto_outputs {
            return 0;
        }
        let needed = self
            .min_outputs
            .unwrap_or(0)
            .max(self.exact_outputs.unwrap_or(0));
        needed.saturating_sub(declared)
    }

    /// Checks the wired input and output counts.
    ///
    /// # Errors
    /// Returns `NetForgeError::ArityViolation` naming the first broken bound.
    pub fn check(&self, node: &str, kind: &str, inputs: usize, outputs: usize) -> Result<(), NetForgeError> {
        let violation = |what: &str, expected: String, actual: usize| NetForgeError::ArityViolation {
            node: node.to_string(),
            kind: kind.to_string(),
            what: what.to_string(),
            expected,
            actual,
        };
        if let Some(n) = self.exact_inputs {
            if inputs != n {
                return Err(violation("inputs", format!("exactly {}", n), inputs));
            }
        }
        if let Some(n) = self.min_inputs {
            if inputs < n {
                return Err(violation("inputs", format!("at least {}", n), inputs));
            }
        }
        if let Some(n) = self.max_inputs {
            if inputs > n {
                return Err(violation("inputs", format!("at most {}", n), inputs));
            }
        }
        if let Some(n) = self.exact_outputs {
            if outputs != n {
                return Err(violation("outputs", format!("exactly {}", n), outputs));
            }
        }
        if let Some(n) = self.min_outputs {
            if outputs < n {
                return Err(violation("outputs", format!("at least {}", n), outputs));
            }
        }
        if let Some(n) = self.max_outputs {
            if outputs > n {
                return Err(violation("outputs", format!("at most {}", n), outputs));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_counts() {
        let arity = Arity::exact(1, 1);
        assert!(arity.check("n", "Square", 1, 1).is_ok());
        let err = arity.check("n", "Square", 2, 1).unwrap_err();
        assert_eq!(
            err,
            NetForgeError::ArityViolation {
                node: "n".to_string(),
                kind: "Square".to_string(),
                what: "inputs".to_string(),
                expected: "exactly 1".to_string(),
                actual: 2,
            }
        );
    }

    #[test]
    fn test_bounded_counts() {
        let arity = Arity {
            exact_inputs: Some(1),
            min_outputs: Some(1),
            ..Default::default()
        };
        assert!(arity.check("n", "Slice", 1, 3).is_ok());
        assert!(arity.check("n", "Slice", 1, 0).is_err());
    }

    #[test]
    fn test_auto_outputs() {
        let arity = Arity::exact(2, 1).with_auto_outputs();
        assert_eq!(arity.missing_outputs(0), 1);
        assert_eq!(arity.missing_outputs(1), 0);
        assert_eq!(Arity::exact(2, 1).missing_outputs(0), 0);
    }
}
