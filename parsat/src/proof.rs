//! Proof generation.
//!
//! Proofs are emitted in the DRAT format: one add or delete entry per learned or removed clause.
//! Proof output is only supported for the sequential solver; the clause exchange of the parallel
//! solver introduces clauses whose derivations live in other instances.

use std::io::{self, Write};

use crate::lit::Lit;

pub mod drat;

/// DRAT proof writer state.
#[derive(Default)]
pub struct Proof<'a> {
    target: Option<Box<dyn Write + 'a>>,
    binary: bool,
    error: Option<io::Error>,
}

impl<'a> Proof<'a> {
    /// Begin writing a proof to the given target.
    pub fn write_proof(&mut self, target: impl Write + 'a, binary: bool) {
        self.target = Some(Box::new(target));
        self.binary = binary;
        self.error = None;
    }

    /// Stop writing the proof.
    pub fn close_proof(&mut self) {
        self.flush();
        self.target = None;
    }

    /// Whether proof steps are currently recorded.
    pub fn is_active(&self) -> bool {
        self.target.is_some()
    }

    /// Record the addition of a derived clause.
    pub fn add_clause(&mut self, lits: &[Lit]) {
        self.write_step(true, lits)
    }

    /// Record the deletion of a clause.
    pub fn delete_clause(&mut self, lits: &[Lit]) {
        self.write_step(false, lits)
    }

    fn write_step(&mut self, add: bool, lits: &[Lit]) {
        if self.error.is_some() {
            return;
        }
        if let Some(target) = &mut self.target {
            let result = if self.binary {
                drat::write_binary_step(target, add, lits)
            } else {
                drat::write_step(target, add, lits)
            };
            if let Err(error) = result {
                self.error = Some(error);
            }
        }
    }

    /// Flush the underlying writer.
    pub fn flush(&mut self) {
        if let Some(target) = &mut self.target {
            if let Err(error) = target.flush() {
                if self.error.is_none() {
                    self.error = Some(error);
                }
            }
        }
    }

    /// The first IO error encountered while writing, if any.
    pub fn take_error(&mut self) -> Option<io::Error> {
        self.error.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_steps() {
        let mut buffer: Vec<u8> = vec![];
        {
            let mut proof = Proof::default();
            proof.write_proof(&mut buffer, false);
            proof.add_clause(&lits![1, -2, 3]);
            proof.delete_clause(&lits![-4]);
            proof.add_clause(&[]);
            proof.close_proof();
        }

        assert_eq!(buffer, b"1 -2 3 0\nd -4 0\n0\n");
    }

    #[test]
    fn binary_steps() {
        let mut buffer: Vec<u8> = vec![];
        {
            let mut proof = Proof::default();
            proof.write_proof(&mut buffer, true);
            proof.add_clause(&lits![1, -2]);
            proof.delete_clause(&lits![1]);
            proof.close_proof();
        }

        // lit codes: 1 -> 0, -2 -> 3; DRAT encodes code + 2.
        assert_eq!(buffer, b"a\x02\x05\x00d\x02\x00");
    }
}
