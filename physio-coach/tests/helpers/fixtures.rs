//! Shared test fixtures

use physio_coach::services::{PoseAnalysis, PoseResult};
use physio_coach::session::ExerciseDefinition;
use physio_common::events::Stage;
use std::io::Cursor;

/// Exercise 1 "Squat" with the given targets
pub fn exercise(target_reps: u32, target_sets: u32) -> ExerciseDefinition {
    ExerciseDefinition::new(1, "Squat", target_reps, target_sets)
        .expect("valid exercise targets")
        .with_duration_seconds(300)
}

/// Successful pose analysis
pub fn analysis(reps: u32, feedback: &str) -> PoseResult {
    PoseResult::Analysis(PoseAnalysis {
        reps,
        stage: Stage::Up,
        knee_angle: Some(165.0),
        hip_angle: Some(170.0),
        feedback: feedback.to_string(),
    })
}

/// 16-bit mono WAV clip of `duration_ms` at 22.05 kHz
pub fn wav_bytes(duration_ms: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 22050,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let frames = 22050 * duration_ms / 1000;

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).expect("wav writer");
        for i in 0..frames {
            let value = ((i as f32 * 0.06).sin() * 6000.0) as i16;
            writer.write_sample(value).expect("wav sample");
        }
        writer.finalize().expect("wav finalize");
    }
    cursor.into_inner()
}
