use std::fmt;

use crate::{
    error::{DbError, DbResult},
    io::{ByteReader, ByteWriter},
    storage::schema::Type,
};

/// A runtime value of one of the supported column types.
///
/// The derived order compares within a type; values of different types
/// never meet in a well-typed column.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Cell {
    Int(i32),
    String(String),
}

impl Cell {
    pub fn get_int(&self) -> DbResult<i32> {
        match self {
            Cell::Int(v) => Ok(*v),
            _ => Err(DbError::SchemaMismatch(format!("not an int: {:?}", self))),
        }
    }

    pub fn get_string(&self) -> DbResult<String> {
        match self {
            Cell::String(v) => Ok(v.clone()),
            _ => Err(DbError::SchemaMismatch(format!("not a string: {:?}", self))),
        }
    }

    pub fn encode(&self, writer: &mut ByteWriter, t: &Type) {
        match (self, t) {
            (Cell::Int(v), Type::Int) => {
                writer.write_i32(*v);
            }
            (Cell::String(v), Type::Char(max_len)) => {
                let bytes = v.as_bytes();
                let len = bytes.len().min(*max_len);
                writer.write_u32(len as u32);
                writer.write_bytes(&bytes[..len]);
                writer.write_bytes(&vec![0; max_len - len]);
            }
            _ => panic!("cell {:?} does not match column type {:?}", self, t),
        }
    }

    pub fn decode(reader: &mut ByteReader, t: &Type) -> Cell {
        match t {
            Type::Int => Cell::Int(reader.read_i32()),
            Type::Char(max_len) => {
                let len = (reader.read_u32() as usize).min(*max_len);
                let bytes = reader.read_bytes(*max_len);
                Cell::String(String::from_utf8_lossy(&bytes[..len]).into_owned())
            }
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Cell::Int(v) => write!(f, "{}", v),
            Cell::String(v) => write!(f, "{:?}", v),
        }
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_order() {
        assert!(Cell::Int(1) < Cell::Int(2));
        assert!(Cell::String("a".to_string()) < Cell::String("b".to_string()));
        assert_eq!(Cell::Int(7), Cell::Int(7));
    }

    #[test]
    fn test_cell_codec_round_trip() {
        let t = Type::Char(8);
        let cell = Cell::String("abc".to_string());

        let mut w = ByteWriter::new();
        cell.encode(&mut w, &t);
        assert_eq!(w.size(), t.get_len());

        let bytes = w.to_padded_bytes(t.get_len());
        let mut r = ByteReader::new(&bytes);
        assert_eq!(Cell::decode(&mut r, &t), cell);
    }

    #[test]
    fn test_string_truncated_to_column_bound() {
        let t = Type::Char(4);
        let cell = Cell::String("abcdefgh".to_string());

        let mut w = ByteWriter::new();
        cell.encode(&mut w, &t);
        let bytes = w.to_padded_bytes(t.get_len());
        let mut r = ByteReader::new(&bytes);
        assert_eq!(Cell::decode(&mut r, &t), Cell::String("abcd".to_string()));
    }
}
