//! Writing of DRAT proof steps.
use std::io::{self, Write};

use crate::lit::Lit;

/// Writes a proof step in DRAT format
pub fn write_step(target: &mut impl Write, add: bool, clause: &[Lit]) -> io::Result<()> {
    if !add {
        target.write_all(b"d ")?;
    }
    write_literals(target, clause)?;
    Ok(())
}

/// Writes a proof step in binary DRAT format
pub fn write_binary_step(target: &mut impl Write, add: bool, clause: &[Lit]) -> io::Result<()> {
    if add {
        target.write_all(b"a")?;
    } else {
        target.write_all(b"d")?;
    }
    write_binary_literals(target, clause)?;
    Ok(())
}

/// Writes the literals of a clause for a step in a DRAT proof.
fn write_literals(target: &mut impl Write, literals: &[Lit]) -> io::Result<()> {
    for &lit in literals {
        itoa::write(&mut *target, lit.to_dimacs())?;
        target.write_all(b" ")?;
    }
    target.write_all(b"0\n")?;
    Ok(())
}

/// Writes the literals of a clause for a step in a binary DRAT proof.
fn write_binary_literals(target: &mut impl Write, literals: &[Lit]) -> io::Result<()> {
    for &lit in literals {
        let drat_code = lit.code() as u64 + 2;
        leb128::write::unsigned(target, drat_code)?;
    }
    target.write_all(&[0])?;
    Ok(())
}
