//! Structural edits of a transaction graph.
//!
//! Commands are addressed by position, so inserting or replacing commands means
//! shifting every `Result`/`NestedResult` that points past the edit. All edits
//! here check everything they need before touching the graph: on error the
//! builder is left exactly as it was.

use crate::builder::{to_u16, TransactionDataBuilder, MAX_ENTRIES};
use crate::error::BuildError;
use crate::validation::check_references;
use sui_ptb_types::{Argument, Command, TransactionData};
use tracing::debug;

/// How references to a replaced command are rewritten.
///
/// Offsets are relative to the replaced command's position, i.e. `0` is the
/// first replacement command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultMapping {
    /// Keep the reference shape, retarget it to replacement command `k`.
    Command(u16),
    /// Every reference becomes `Result(index + k)`. A `NestedResult(_, m)` with
    /// `m != 0` cannot be expressed and is rejected; slot 0 maps to the single result.
    Result(u16),
    /// Every reference becomes `NestedResult(index + k, j)`.
    NestedResult(u16, u16),
}

impl Default for ResultMapping {
    fn default() -> Self {
        ResultMapping::Command(0)
    }
}

impl ResultMapping {
    fn offset(&self) -> u16 {
        match self {
            ResultMapping::Command(k) | ResultMapping::Result(k) => *k,
            ResultMapping::NestedResult(k, _) => *k,
        }
    }
}

fn shift(c: u16, by: usize) -> Result<u16, BuildError> {
    to_u16(c as usize + by, "commands")
}

fn with_command(arg: Argument, c: u16) -> Argument {
    match arg {
        Argument::Result(_) => Argument::Result(c),
        Argument::NestedResult(_, k) => Argument::NestedResult(c, k),
        other => other,
    }
}

impl TransactionDataBuilder {
    /// Apply `f(argument, command, command_index)` to every argument in the graph.
    pub fn map_arguments<F>(&mut self, mut f: F)
    where
        F: FnMut(Argument, &Command, usize) -> Argument,
    {
        for idx in 0..self.data.commands.len() {
            let command = &self.data.commands[idx];
            let mapped: Vec<Argument> = command
                .arguments()
                .into_iter()
                .map(|arg| f(*arg, command, idx))
                .collect();
            for (slot, arg) in self.data.commands[idx].arguments_mut().into_iter().zip(mapped) {
                *slot = arg;
            }
        }
    }

    /// Fallible [`map_arguments`](Self::map_arguments). Nothing is written unless
    /// every call succeeds.
    pub fn try_map_arguments<F>(&mut self, mut f: F) -> Result<(), BuildError>
    where
        F: FnMut(Argument, &Command, usize) -> Result<Argument, BuildError>,
    {
        let mut rewritten = Vec::with_capacity(self.data.commands.len());
        for (idx, command) in self.data.commands.iter().enumerate() {
            let args = command
                .arguments()
                .into_iter()
                .map(|arg| f(*arg, command, idx))
                .collect::<Result<Vec<_>, _>>()?;
            rewritten.push(args);
        }
        for (command, args) in self.data.commands.iter_mut().zip(rewritten) {
            for (slot, arg) in command.arguments_mut().into_iter().zip(args) {
                *slot = arg;
            }
        }
        Ok(())
    }

    /// Replace `commands[index]` with `replacement`.
    ///
    /// Replacement commands are spliced verbatim: any `Result` they hold is an
    /// absolute index in the final graph. Commands after the replaced one move by
    /// `replacement.len() - 1`; references to the replaced command are rewritten
    /// per `mapping`. An empty replacement removes the command, which is only
    /// allowed when nothing references it.
    pub fn replace_command(
        &mut self,
        index: usize,
        replacement: Vec<Command>,
        mapping: ResultMapping,
    ) -> Result<(), BuildError> {
        let len = self.data.commands.len();
        if index >= len {
            return Err(BuildError::CommandIndexOutOfRange { index, len });
        }
        let new_len = len - 1 + replacement.len();
        if new_len > MAX_ENTRIES {
            return Err(BuildError::CapacityExceeded {
                what: "commands",
                len: new_len,
            });
        }

        let n = replacement.len();
        let target = to_u16(index, "commands")?;
        let mapped_target = if (mapping.offset() as usize) < n {
            Some(shift(target, mapping.offset() as usize)?)
        } else {
            None
        };

        let remap = |arg: Argument, command: usize| -> Result<Argument, BuildError> {
            let Some(c) = arg.command_index() else {
                return Ok(arg);
            };
            if c < target {
                return Ok(arg);
            }
            if c > target {
                return Ok(with_command(arg, to_u16(c as usize + n - 1, "commands")?));
            }
            if n == 0 {
                return Err(BuildError::DanglingReference {
                    command,
                    reference: arg,
                });
            }
            let new_c = mapped_target.ok_or(BuildError::MappingOutOfRange {
                mapping,
                replacement_len: n,
            })?;
            match (mapping, arg) {
                (ResultMapping::Command(_), _) => Ok(with_command(arg, new_c)),
                (ResultMapping::Result(_), Argument::NestedResult(_, m)) if m != 0 => {
                    Err(BuildError::UnmappableReference {
                        command,
                        reference: arg,
                        mapping,
                    })
                }
                (ResultMapping::Result(_), _) => Ok(Argument::Result(new_c)),
                (ResultMapping::NestedResult(_, j), _) => Ok(Argument::NestedResult(new_c, j)),
            }
        };

        // Compute every rewrite before mutating anything.
        let mut rewritten = Vec::with_capacity(len - index - 1);
        for (offset, command) in self.data.commands[index + 1..].iter().enumerate() {
            let args = command
                .arguments()
                .into_iter()
                .map(|arg| remap(*arg, index + 1 + offset))
                .collect::<Result<Vec<_>, _>>()?;
            rewritten.push(args);
        }

        for (command, args) in self.data.commands[index + 1..].iter_mut().zip(rewritten) {
            for (slot, arg) in command.arguments_mut().into_iter().zip(args) {
                *slot = arg;
            }
        }
        self.data.commands.splice(index..=index, replacement);

        debug!(index, replacement_len = n, ?mapping, "replaced command");
        Ok(())
    }

    /// Splice another transaction's commands in at `at`, merging its inputs into
    /// this graph's input table.
    ///
    /// References inside `other` are relative to its own lists and are rebased;
    /// references in this graph to commands at or after `at` move by the number
    /// of inserted commands.
    pub fn insert_transaction(
        &mut self,
        at: usize,
        other: &TransactionData,
    ) -> Result<(), BuildError> {
        let len = self.data.commands.len();
        if at > len {
            return Err(BuildError::CommandIndexOutOfRange { index: at, len });
        }
        let n = other.commands.len();
        if len + n > MAX_ENTRIES {
            return Err(BuildError::CapacityExceeded {
                what: "commands",
                len: len + n,
            });
        }
        check_references(&other.commands, other.inputs.len())?;

        // Input merging mutates the table, so work on a copy and commit at the end.
        let mut next = self.clone();
        let at16 = to_u16(at, "commands")?;

        next.try_map_arguments(|arg, _, _| match arg.command_index() {
            Some(c) if c >= at16 => Ok(with_command(arg, shift(c, n)?)),
            _ => Ok(arg),
        })?;

        let mut input_map = Vec::with_capacity(other.inputs.len());
        for input in &other.inputs {
            input_map.push(next.add_input(input.clone())?);
        }

        let mut inserted = other.commands.clone();
        for command in &mut inserted {
            for slot in command.arguments_mut() {
                *slot = match *slot {
                    Argument::Input(i) => input_map[i as usize],
                    Argument::Result(c) => Argument::Result(shift(c, at)?),
                    Argument::NestedResult(c, k) => Argument::NestedResult(shift(c, at)?, k),
                    Argument::GasCoin => Argument::GasCoin,
                };
            }
        }
        next.data.commands.splice(at..at, inserted);

        debug!(
            at,
            inserted = n,
            inputs = next.data.inputs.len(),
            "inserted transaction"
        );
        *self = next;
        Ok(())
    }
}
