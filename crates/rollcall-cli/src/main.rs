//! Single-shot frame processing for web terminals.
//!
//! Reads one image, matches it against the gallery, marks attendance for
//! recognized students, and prints a machine-readable JSON result on
//! stdout. Logs go to stderr so stdout stays parseable. Exit code 0 means
//! structural success (even with zero faces); a non-zero exit carries an
//! `{"error": ...}` payload instead of a report.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use rollcall_core::{EuclideanMatcher, FaceEngine, Gallery, GalleryRow, Recognizer, SidecarEngine};
use rollcall_store::{writer, AttendanceStatus, Store, TransitionIntent};

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall attendance CLI — process one camera frame")]
struct Cli {
    /// Image file to process
    #[arg(long)]
    image: PathBuf,

    /// Class the frame was captured for
    #[arg(long)]
    class_id: i64,

    /// Identifier of the submitting terminal (recorded in the activity log)
    #[arg(long)]
    terminal_id: String,

    /// SQLite database path
    #[arg(long, env = "ROLLCALL_DB_PATH")]
    db: PathBuf,

    /// Face-encoding helper command
    #[arg(long, env = "ROLLCALL_ENGINE_CMD")]
    engine: String,
}

#[derive(Serialize)]
struct FrameReport {
    faces: Vec<FaceReport>,
    attendance_marked: Vec<MarkedStudent>,
    total_faces: usize,
}

#[derive(Serialize)]
struct FaceReport {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    recognized: bool,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    student_id: Option<String>,
    confidence: f32,
}

#[derive(Serialize)]
struct MarkedStudent {
    student_id: String,
    student_name: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(report) => match serde_json::to_string(&report) {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(err) => {
                println!("{}", serde_json::json!({ "error": err.to_string() }));
                ExitCode::FAILURE
            }
        },
        Err(err) => {
            println!("{}", serde_json::json!({ "error": format!("{err:#}") }));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<FrameReport> {
    let image = image::open(&cli.image)
        .with_context(|| format!("could not load image {}", cli.image.display()))?
        .to_luma8();
    let (width, height) = image.dimensions();
    let frame = image.into_raw();

    let store = Store::open(&cli.db)
        .await
        .context("failed to open attendance store")?;

    let rows = store
        .students_with_encoding()
        .await
        .context("failed to read student encodings")?;
    let load = match Gallery::load(rows.into_iter().map(|row| GalleryRow {
        student_id: row.student_id,
        name: row.name,
        encoding: row.encoding,
    })) {
        Ok(load) => load,
        Err(err) => {
            // An empty gallery is a steady state here, not a failure.
            tracing::warn!(error = %err, "no usable gallery; nothing to match");
            return Ok(FrameReport {
                faces: Vec::new(),
                attendance_marked: Vec::new(),
                total_faces: 0,
            });
        }
    };
    tracing::info!(valid = load.valid, invalid = load.invalid, "gallery loaded");

    let engine = SidecarEngine::new(&cli.engine)?;
    let observations =
        tokio::task::spawn_blocking(move || engine.extract(&frame, width, height))
            .await
            .context("engine worker join failed")??;

    let recognizer = Recognizer::new(EuclideanMatcher::default());
    let detections = recognizer.detect(&observations, &load.gallery);

    let mut faces = Vec::new();
    let mut attendance_marked = Vec::new();
    let marked_at = Utc::now();

    for detection in &detections {
        let b = &detection.bounding_box;
        match &detection.identity {
            Some(identity) => {
                faces.push(FaceReport {
                    x: b.x,
                    y: b.y,
                    width: b.width,
                    height: b.height,
                    recognized: true,
                    name: identity.name.clone(),
                    student_id: Some(identity.student_id.clone()),
                    confidence: detection.confidence,
                });

                let intent = TransitionIntent {
                    student_id: identity.student_id.clone(),
                    class_id: cli.class_id,
                    status: AttendanceStatus::Present,
                    marked_at,
                };
                match writer::apply(&store, &intent).await {
                    Ok(_) => attendance_marked.push(MarkedStudent {
                        student_id: identity.student_id.clone(),
                        student_name: identity.name.clone(),
                    }),
                    Err(err) => tracing::error!(
                        student = %identity.student_id,
                        error = %err,
                        "attendance write failed"
                    ),
                }
            }
            None => faces.push(FaceReport {
                x: b.x,
                y: b.y,
                width: b.width,
                height: b.height,
                recognized: false,
                name: "Unknown".to_string(),
                student_id: None,
                confidence: detection.confidence,
            }),
        }
    }

    let total_faces = faces.len();
    if let Err(err) = store
        .append_activity_log(&format!(
            "terminal {} processed frame for class {}: {} faces, {} marked",
            cli.terminal_id,
            cli.class_id,
            total_faces,
            attendance_marked.len()
        ))
        .await
    {
        tracing::warn!(error = %err, "activity log append failed");
    }

    Ok(FrameReport {
        faces,
        attendance_marked,
        total_faces,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_serializes_with_stable_field_names() {
        let report = FrameReport {
            faces: vec![FaceReport {
                x: 1.0,
                y: 2.0,
                width: 3.0,
                height: 4.0,
                recognized: true,
                name: "Ada".into(),
                student_id: Some("S001".into()),
                confidence: 0.7,
            }],
            attendance_marked: vec![MarkedStudent {
                student_id: "S001".into(),
                student_name: "Ada".into(),
            }],
            total_faces: 1,
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["total_faces"], 1);
        assert_eq!(json["faces"][0]["recognized"], true);
        assert_eq!(json["faces"][0]["student_id"], "S001");
        assert_eq!(json["attendance_marked"][0]["student_name"], "Ada");
    }

    #[test]
    fn unrecognized_face_omits_student_id() {
        let report = FrameReport {
            faces: vec![FaceReport {
                x: 0.0,
                y: 0.0,
                width: 1.0,
                height: 1.0,
                recognized: false,
                name: "Unknown".into(),
                student_id: None,
                confidence: 0.0,
            }],
            attendance_marked: Vec::new(),
            total_faces: 1,
        };

        let json = serde_json::to_value(&report).unwrap();
        assert!(json["faces"][0].get("student_id").is_none());
    }
}
