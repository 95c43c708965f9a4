//! External face-engine boundary.
//!
//! Face localization and encoding extraction are not implemented here; they
//! are consumed through [`FaceEngine`]. The production implementation,
//! [`SidecarEngine`], pipes each frame to a configured helper process as
//! binary PGM and parses a JSON array of observations from its stdout.

use std::io::Write;
use std::process::{Command, Stdio};

use serde::Deserialize;
use thiserror::Error;

use crate::types::{BoundingBox, Encoding};

/// One face the engine located, with its extracted encoding.
#[derive(Debug, Clone)]
pub struct FaceObservation {
    pub bounding_box: BoundingBox,
    pub encoding: Encoding,
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("engine command is empty")]
    EmptyCommand,
    #[error("failed to run {program:?}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("engine i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("engine exited with {status}")]
    Failed { status: std::process::ExitStatus },
    #[error("malformed engine output: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Boundary to the external face capability.
///
/// Pure with respect to this crate: grayscale frame in, observations out.
pub trait FaceEngine {
    fn extract(
        &self,
        frame: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<FaceObservation>, EngineError>;
}

/// Engine that shells out to a helper process per frame.
///
/// Wire format: the frame goes to the child's stdin as binary PGM (P5);
/// the child prints a JSON array
/// `[{"box": {"x":..,"y":..,"width":..,"height":..}, "encoding": [..]}]`
/// on stdout and exits 0.
pub struct SidecarEngine {
    program: String,
    args: Vec<String>,
}

impl SidecarEngine {
    /// Build from a whitespace-separated command line, e.g.
    /// `"python3 /opt/rollcall/encode_faces.py"`.
    pub fn new(command_line: &str) -> Result<Self, EngineError> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or(EngineError::EmptyCommand)?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }
}

impl FaceEngine for SidecarEngine {
    fn extract(
        &self,
        frame: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<FaceObservation>, EngineError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|source| EngineError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            write_pgm(&mut stdin, frame, width, height)?;
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(EngineError::Failed {
                status: output.status,
            });
        }

        parse_observations(&output.stdout)
    }
}

fn write_pgm(w: &mut impl Write, data: &[u8], width: u32, height: u32) -> std::io::Result<()> {
    write!(w, "P5\n{width} {height}\n255\n")?;
    w.write_all(data)
}

#[derive(Deserialize)]
struct WireObservation {
    #[serde(rename = "box")]
    bounding_box: BoundingBox,
    encoding: Vec<f32>,
}

fn parse_observations(raw: &[u8]) -> Result<Vec<FaceObservation>, EngineError> {
    let wire: Vec<WireObservation> = serde_json::from_slice(raw)?;
    Ok(wire
        .into_iter()
        .map(|w| FaceObservation {
            bounding_box: w.bounding_box,
            encoding: Encoding { values: w.encoding },
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pgm_header_and_payload() {
        let mut out = Vec::new();
        write_pgm(&mut out, &[1, 2, 3, 4, 5, 6], 3, 2).unwrap();
        assert!(out.starts_with(b"P5\n3 2\n255\n"));
        assert_eq!(&out[out.len() - 6..], &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn parses_observation_array() {
        let raw = br#"[
            {"box": {"x": 10.0, "y": 20.0, "width": 64.0, "height": 64.0},
             "encoding": [0.1, 0.2, 0.3]}
        ]"#;
        let obs = parse_observations(raw).unwrap();
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].bounding_box.x, 10.0);
        assert_eq!(obs[0].encoding.values, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn parses_empty_array() {
        let obs = parse_observations(b"[]").unwrap();
        assert!(obs.is_empty());
    }

    #[test]
    fn rejects_malformed_output() {
        assert!(matches!(
            parse_observations(b"not json"),
            Err(EngineError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_empty_command() {
        assert!(matches!(
            SidecarEngine::new("   "),
            Err(EngineError::EmptyCommand)
        ));
    }

    #[test]
    fn splits_command_line() {
        let engine = SidecarEngine::new("python3 encode.py --fast").unwrap();
        assert_eq!(engine.program, "python3");
        assert_eq!(engine.args, vec!["encode.py", "--fast"]);
    }
}
