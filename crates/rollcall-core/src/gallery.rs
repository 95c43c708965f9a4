//! Known-face gallery and its validating loader.
//!
//! The gallery is an in-memory snapshot loaded at startup; a reload is a
//! full swap by the caller, never an in-place mutation.

use thiserror::Error;

use crate::types::{Encoding, ENCODING_DIM};

/// One known identity: stable student id, display name, face encoding.
#[derive(Debug, Clone)]
pub struct GalleryMember {
    pub student_id: String,
    pub name: String,
    pub encoding: Encoding,
}

/// Immutable collection of known identities.
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    members: Vec<GalleryMember>,
}

impl Gallery {
    pub fn members(&self) -> &[GalleryMember] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Parse and validate raw store rows into a gallery.
    ///
    /// Rows with an empty payload, non-numeric tokens, or the wrong
    /// dimensionality are rejected individually and counted; loading
    /// continues. Zero valid rows fails the whole load — an empty gallery
    /// makes the recognizer useless.
    pub fn load<I>(rows: I) -> Result<GalleryLoad, GalleryError>
    where
        I: IntoIterator<Item = GalleryRow>,
    {
        let mut members = Vec::new();
        let mut invalid = 0usize;

        for row in rows {
            match parse_encoding(&row.encoding) {
                Ok(encoding) => {
                    tracing::debug!(student = %row.student_id, "loaded encoding");
                    members.push(GalleryMember {
                        student_id: row.student_id,
                        name: row.name,
                        encoding,
                    });
                }
                Err(err) => {
                    invalid += 1;
                    tracing::warn!(
                        student = %row.student_id,
                        error = %err,
                        "skipping invalid encoding"
                    );
                }
            }
        }

        if members.is_empty() {
            return Err(GalleryError::Empty { invalid });
        }

        let valid = members.len();
        Ok(GalleryLoad {
            gallery: Gallery { members },
            valid,
            invalid,
        })
    }
}

/// Raw gallery row as read from the store, encoding still unparsed.
#[derive(Debug, Clone)]
pub struct GalleryRow {
    pub student_id: String,
    pub name: String,
    /// Comma-separated float list.
    pub encoding: String,
}

/// A loaded gallery plus per-row validation counts.
/// `valid + invalid` equals the number of rows read.
#[derive(Debug)]
pub struct GalleryLoad {
    pub gallery: Gallery,
    pub valid: usize,
    pub invalid: usize,
}

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("no valid face encodings in store ({invalid} rows rejected)")]
    Empty { invalid: usize },
}

#[derive(Error, Debug)]
enum EncodingParseError {
    #[error("empty payload")]
    EmptyPayload,
    #[error("non-numeric token {token:?}")]
    NonNumeric { token: String },
    #[error("expected {} dimensions, got {}", ENCODING_DIM, .got)]
    WrongDimension { got: usize },
}

fn parse_encoding(text: &str) -> Result<Encoding, EncodingParseError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(EncodingParseError::EmptyPayload);
    }

    let mut values = Vec::with_capacity(ENCODING_DIM);
    for token in text.split(',') {
        let token = token.trim();
        let value = token
            .parse::<f32>()
            .map_err(|_| EncodingParseError::NonNumeric {
                token: token.to_string(),
            })?;
        values.push(value);
    }

    if values.len() != ENCODING_DIM {
        return Err(EncodingParseError::WrongDimension { got: values.len() });
    }

    Ok(Encoding { values })
}
