//! Static reference checks over a command list.
//!
//! A transaction is evaluated in command order, so every result reference must
//! point at a command strictly before the one using it, and every input
//! reference must be inside the input table.

use sui_ptb_types::{Argument, Command};
use thiserror::Error;

/// Types of reference errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceErrorKind {
    /// Reference to a result that doesn't exist yet (forward reference).
    ForwardReference,
    /// Self-reference (command references its own result).
    SelfReference,
    /// Reference to an input index that's out of bounds.
    InputOutOfBounds,
}

/// A bad argument found in a command list.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("command {command_index}: {message}")]
pub struct ReferenceError {
    /// The command index where the error was found.
    pub command_index: usize,
    pub kind: ReferenceErrorKind,
    pub argument: Argument,
    /// Human-readable description of the error.
    pub message: String,
}

/// Collect every reference error in `commands`.
///
/// # Arguments
/// * `commands` - The commands to check
/// * `num_inputs` - Number of entries in the input table
pub fn find_reference_errors(commands: &[Command], num_inputs: usize) -> Vec<ReferenceError> {
    let mut errors = Vec::new();

    for (cmd_idx, cmd) in commands.iter().enumerate() {
        for &arg in cmd.arguments() {
            match arg {
                Argument::GasCoin => {}
                Argument::Input(idx) => {
                    if (idx as usize) >= num_inputs {
                        errors.push(ReferenceError {
                            command_index: cmd_idx,
                            kind: ReferenceErrorKind::InputOutOfBounds,
                            argument: arg,
                            message: format!(
                                "references Input({}) but only {} inputs available",
                                idx, num_inputs
                            ),
                        });
                    }
                }
                Argument::Result(result_idx) | Argument::NestedResult(result_idx, _) => {
                    let result_idx = result_idx as usize;
                    if result_idx == cmd_idx {
                        errors.push(ReferenceError {
                            command_index: cmd_idx,
                            kind: ReferenceErrorKind::SelfReference,
                            argument: arg,
                            message: format!("references its own result via {:?}", arg),
                        });
                    } else if result_idx > cmd_idx {
                        errors.push(ReferenceError {
                            command_index: cmd_idx,
                            kind: ReferenceErrorKind::ForwardReference,
                            argument: arg,
                            message: format!(
                                "references {:?} which hasn't been produced yet",
                                arg
                            ),
                        });
                    }
                }
            }
        }
    }

    errors
}

/// First reference error in `commands`, if any.
pub fn check_references(commands: &[Command], num_inputs: usize) -> Result<(), ReferenceError> {
    match find_reference_errors(commands, num_inputs).into_iter().next() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(coin: Argument, amounts: Vec<Argument>) -> Command {
        Command::SplitCoins { coin, amounts }
    }

    #[test]
    fn test_valid_chain() {
        let commands = vec![
            split(Argument::GasCoin, vec![Argument::Input(0)]),
            Command::TransferObjects {
                objects: vec![Argument::NestedResult(0, 0)],
                address: Argument::Input(1),
            },
        ];
        assert!(find_reference_errors(&commands, 2).is_empty());
    }

    #[test]
    fn test_forward_and_self_references() {
        let commands = vec![
            split(Argument::Result(1), vec![]),
            split(Argument::NestedResult(1, 0), vec![]),
        ];
        let errors = find_reference_errors(&commands, 0);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].kind, ReferenceErrorKind::ForwardReference);
        assert_eq!(errors[1].kind, ReferenceErrorKind::SelfReference);
    }

    #[test]
    fn test_input_out_of_bounds() {
        let commands = vec![split(Argument::GasCoin, vec![Argument::Input(3)])];
        let err = check_references(&commands, 3).unwrap_err();
        assert_eq!(err.kind, ReferenceErrorKind::InputOutOfBounds);
        assert_eq!(err.argument, Argument::Input(3));
        assert!(err.to_string().contains("only 3 inputs"));
    }
}
