//! DIMACS CNF parser and writer.
use std::{io, mem::replace};

use anyhow::Error;
use thiserror::Error;

use crate::cnf::CnfFormula;
use crate::lit::{Lit, Var};

/// Possible errors while parsing a DIMACS CNF formula.
#[derive(Debug, Error)]
pub enum ParserError {
    #[error("line {line}: unexpected character in DIMACS CNF input: '{unexpected}'")]
    UnexpectedInput { line: usize, unexpected: char },
    #[error("line {line}: literal index is too large: {index}{final_digit}...")]
    LiteralTooLarge {
        line: usize,
        index: usize,
        final_digit: usize,
    },
    #[error("line {line}: invalid header syntax: {header}")]
    InvalidHeader { line: usize, header: String },
    #[error("line {line}: unterminated clause")]
    UnterminatedClause { line: usize },
    #[error("formula has {var_count} variables while the header specifies {header_var_count}")]
    VarCount {
        var_count: usize,
        header_var_count: usize,
    },
    #[error("formula has {clause_count} clauses while the header specifies {header_clause_count}")]
    ClauseCount {
        clause_count: usize,
        header_clause_count: usize,
    },
    #[error("parser invoked after a previous error")]
    PreviousError,
}

/// Variable and clause count present in a DIMACS CNF header.
#[derive(Copy, Clone, Debug)]
pub struct DimacsHeader {
    pub var_count: usize,
    pub clause_count: usize,
}

/// Parser for DIMACS CNF files.
///
/// This parser can consume the input in chunks while also producing the parsed result in chunks.
#[derive(Default)]
pub struct DimacsParser {
    formula: CnfFormula,
    partial_clause: Vec<Lit>,
    header: Option<DimacsHeader>,

    line_number: usize,
    clause_count: usize,
    partial_lit: usize,
    negate_next_lit: bool,

    in_lit: bool,
    in_comment: bool,
    in_header: bool,
    error: bool,

    header_line: Vec<u8>,
}

impl DimacsParser {
    /// Create a new DIMACS CNF parser.
    pub fn new() -> DimacsParser {
        DimacsParser {
            line_number: 1,
            ..DimacsParser::default()
        }
    }

    /// Parse the given input and check the header if present.
    ///
    /// This parses the whole input into a single [`CnfFormula`]. Incremental parsing is possible
    /// using [`parse_incremental`](DimacsParser::parse_incremental) or the
    /// [`parse_chunk`](DimacsParser::parse_chunk) method.
    pub fn parse(input: impl io::Read) -> Result<CnfFormula, Error> {
        Ok(Self::parse_incremental(input, |_| Ok(()))?.take_formula())
    }

    /// Parse the given input incrementally and check the header if present.
    ///
    /// The callback is invoked repeatedly with a reference to the parser. The callback can process
    /// the formula incrementally by calling [`take_formula`](DimacsParser::take_formula) on the
    /// passed argument.
    pub fn parse_incremental(
        input: impl io::Read,
        mut callback: impl FnMut(&mut DimacsParser) -> Result<(), Error>,
    ) -> Result<DimacsParser, Error> {
        use io::BufRead;

        let mut buffer = io::BufReader::new(input);
        let mut parser = Self::new();

        loop {
            let data = buffer.fill_buf()?;
            if data.is_empty() {
                break;
            }
            parser.parse_chunk(data)?;
            let len = data.len();
            buffer.consume(len);

            callback(&mut parser)?;
        }
        parser.eof()?;
        callback(&mut parser)?;
        parser.check_header()?;

        Ok(parser)
    }

    /// Parse a chunk of input.
    ///
    /// A chunk may end in the middle of a token or clause. Use [`eof`](DimacsParser::eof) after
    /// the last chunk.
    pub fn parse_chunk(&mut self, chunk: &[u8]) -> Result<(), ParserError> {
        if self.error {
            return Err(ParserError::PreviousError);
        }
        match self.parse_chunk_inner(chunk) {
            Err(err) => {
                self.error = true;
                Err(err)
            }
            ok => ok,
        }
    }

    fn parse_chunk_inner(&mut self, chunk: &[u8]) -> Result<(), ParserError> {
        for &byte in chunk {
            if self.in_comment {
                if byte == b'\n' {
                    self.in_comment = false;
                    self.line_number += 1;
                }
                continue;
            }
            if self.in_header {
                if byte == b'\n' {
                    self.finish_header()?;
                    self.in_header = false;
                    self.line_number += 1;
                } else {
                    self.header_line.push(byte);
                }
                continue;
            }
            match byte {
                b'0'..=b'9' => {
                    let digit = (byte - b'0') as usize;
                    let index = self.partial_lit;
                    if index >= (Var::max_count() + 9) / 10 {
                        return Err(ParserError::LiteralTooLarge {
                            line: self.line_number,
                            index,
                            final_digit: digit,
                        });
                    }
                    self.partial_lit = index * 10 + digit;
                    self.in_lit = true;
                }
                b'-' if !self.in_lit && !self.negate_next_lit => {
                    self.negate_next_lit = true;
                }
                b' ' | b'\t' | b'\r' | b'\n' => {
                    self.finish_lit()?;
                    if byte == b'\n' {
                        self.line_number += 1;
                    }
                }
                b'c' if !self.in_lit && !self.negate_next_lit => {
                    self.in_comment = true;
                }
                b'p' if !self.in_lit && !self.negate_next_lit && self.header.is_none() => {
                    self.in_header = true;
                    self.header_line.clear();
                    self.header_line.push(byte);
                }
                _ => {
                    return Err(ParserError::UnexpectedInput {
                        line: self.line_number,
                        unexpected: byte as char,
                    });
                }
            }
        }
        Ok(())
    }

    fn finish_lit(&mut self) -> Result<(), ParserError> {
        if self.in_lit {
            let number = self.partial_lit;
            if number == 0 {
                if self.negate_next_lit {
                    return Err(ParserError::UnexpectedInput {
                        line: self.line_number,
                        unexpected: '0',
                    });
                }
                self.formula.add_clause(self.partial_clause.drain(..));
                self.clause_count += 1;
            } else {
                if number > Var::max_count() {
                    return Err(ParserError::LiteralTooLarge {
                        line: self.line_number,
                        index: number / 10,
                        final_digit: number % 10,
                    });
                }
                let mut lit = Lit::from_dimacs(number as isize);
                lit = lit ^ self.negate_next_lit;
                self.partial_clause.push(lit);
            }
            self.partial_lit = 0;
            self.in_lit = false;
            self.negate_next_lit = false;
        } else if self.negate_next_lit {
            return Err(ParserError::UnexpectedInput {
                line: self.line_number,
                unexpected: '-',
            });
        }
        Ok(())
    }

    fn finish_header(&mut self) -> Result<(), ParserError> {
        let line = String::from_utf8_lossy(&self.header_line).into_owned();
        let mut tokens = line.split_whitespace();

        let invalid = || ParserError::InvalidHeader {
            line: self.line_number,
            header: line.clone(),
        };

        if tokens.next() != Some("p") || tokens.next() != Some("cnf") {
            return Err(invalid());
        }
        let var_count: usize = tokens.next().and_then(|t| t.parse().ok()).ok_or_else(invalid)?;
        let clause_count: usize =
            tokens.next().and_then(|t| t.parse().ok()).ok_or_else(invalid)?;
        if tokens.next().is_some() {
            return Err(invalid());
        }

        self.header = Some(DimacsHeader {
            var_count,
            clause_count,
        });
        self.formula.set_var_count(var_count);
        Ok(())
    }

    /// Finish parsing.
    pub fn eof(&mut self) -> Result<(), ParserError> {
        if self.error {
            return Err(ParserError::PreviousError);
        }
        if self.in_header {
            self.finish_header()?;
            self.in_header = false;
        }
        self.finish_lit()?;
        if !self.partial_clause.is_empty() {
            self.error = true;
            return Err(ParserError::UnterminatedClause {
                line: self.line_number,
            });
        }
        Ok(())
    }

    /// Check the var and clause counts of the header if present.
    pub fn check_header(&self) -> Result<(), ParserError> {
        if let Some(header) = self.header {
            if self.var_count() > header.var_count {
                return Err(ParserError::VarCount {
                    var_count: self.var_count(),
                    header_var_count: header.var_count,
                });
            }
            if self.clause_count != header.clause_count {
                return Err(ParserError::ClauseCount {
                    clause_count: self.clause_count,
                    header_clause_count: header.clause_count,
                });
            }
        }
        Ok(())
    }

    /// Returns the parsed formula and resets the incremental buffer.
    ///
    /// The variable count of the returned formula matches the header or the largest variable seen
    /// so far.
    pub fn take_formula(&mut self) -> CnfFormula {
        let mut formula = replace(&mut self.formula, CnfFormula::new());
        if let Some(header) = self.header {
            formula.set_var_count(header.var_count);
        }
        self.formula.set_var_count(formula.var_count());
        formula
    }

    /// The header of the parsed file if present.
    pub fn header(&self) -> Option<DimacsHeader> {
        self.header
    }

    /// Number of variables parsed or declared so far.
    pub fn var_count(&self) -> usize {
        self.formula.var_count()
    }

    /// Number of clauses parsed so far.
    pub fn clause_count(&self) -> usize {
        self.clause_count
    }
}

/// Write a formula in DIMACS CNF format.
pub fn write_dimacs(target: &mut impl io::Write, formula: &CnfFormula) -> io::Result<()> {
    target.write_all(b"p cnf ")?;
    itoa::write(&mut *target, formula.var_count())?;
    target.write_all(b" ")?;
    itoa::write(&mut *target, formula.len())?;
    target.write_all(b"\n")?;

    for clause in formula.iter() {
        for &lit in clause {
            itoa::write(&mut *target, lit.to_dimacs())?;
            target.write_all(b" ")?;
        }
        target.write_all(b"0\n")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    use crate::cnf::strategy::cnf_formula;

    #[test]
    fn parse_simple() {
        let input = b"c comment\np cnf 3 2\n1 -2 3 0\n-1 2 0\n";
        let formula = DimacsParser::parse(&input[..]).unwrap();

        let expected = cnf_formula![
            1, -2, 3;
            -1, 2;
        ];
        assert_eq!(formula, expected);
    }

    #[test]
    fn parse_split_tokens_across_chunks() {
        let mut parser = DimacsParser::new();
        parser.parse_chunk(b"p cnf 2 1\n-").unwrap();
        parser.parse_chunk(b"1 2").unwrap();
        parser.parse_chunk(b" 0\n").unwrap();
        parser.eof().unwrap();
        parser.check_header().unwrap();

        let formula = parser.take_formula();
        assert_eq!(formula, cnf_formula![-1, 2;]);
    }

    #[test]
    fn header_mismatch_is_reported() {
        let input = b"p cnf 2 3\n1 2 0\n";
        assert!(DimacsParser::parse(&input[..]).is_err());
    }

    #[test]
    fn garbage_is_reported() {
        let input = b"p cnf 2 1\n1 x 0\n";
        assert!(DimacsParser::parse(&input[..]).is_err());
    }

    proptest! {
        #[test]
        fn roundtrip_write_parse(formula in cnf_formula(1..100usize, 0..500, 0..10)) {
            let mut written = vec![];
            write_dimacs(&mut written, &formula).unwrap();

            let parsed = DimacsParser::parse(&written[..]).unwrap();
            prop_assert_eq!(parsed, formula);
        }
    }
}
