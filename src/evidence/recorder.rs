//! Continuous session recording into bounded rolling buffers, and clip
//! extraction on a block.
//!
//! The recorder keeps only what a clip needs: the last couple of seconds
//! of raw audio and the most recent frames. On a terminal decision it
//! packages them as `clip.wav` + `frame_NN.jpg` + `meta.json` in a
//! gzipped tarball and seals it with a SHA-256 digest.

use anyhow::{Context, Result};
use chrono::Utc;
use flate2::write::GzEncoder;
use flate2::Compression;
use hound::{WavSpec, WavWriter};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::media::{AudioChunk, CapturedFrame};

use super::EvidenceRecord;

#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Length of the extracted evidence clip.
    pub clip_ms: u64,
    /// Frames retained alongside the audio tail.
    pub max_frames: usize,
    /// Where finished bundles land.
    pub evidence_dir: PathBuf,
}

impl RecorderConfig {
    pub fn new(evidence_dir: PathBuf) -> Self {
        Self {
            clip_ms: 2000,
            max_frames: 4,
            evidence_dir,
        }
    }
}

pub struct SessionRecorder {
    cfg: RecorderConfig,
    frames: VecDeque<CapturedFrame>,
    audio: VecDeque<f32>,
    sample_rate: Option<u32>,
}

impl SessionRecorder {
    pub fn new(cfg: RecorderConfig) -> Self {
        Self {
            cfg,
            frames: VecDeque::new(),
            audio: VecDeque::new(),
            sample_rate: None,
        }
    }

    pub fn push_audio(&mut self, chunk: &AudioChunk) {
        if chunk.samples.is_empty() {
            return;
        }
        self.sample_rate = Some(chunk.sample_rate);
        self.audio.extend(chunk.samples.iter().copied());

        let cap = (chunk.sample_rate as u64 * self.cfg.clip_ms / 1000) as usize;
        while self.audio.len() > cap {
            self.audio.pop_front();
        }
    }

    pub fn push_frame(&mut self, frame: CapturedFrame) {
        if self.frames.len() == self.cfg.max_frames {
            self.frames.pop_front();
        }
        self.frames.push_back(frame);
    }

    pub fn buffered_audio_len(&self) -> usize {
        self.audio.len()
    }

    pub fn buffered_frames(&self) -> usize {
        self.frames.len()
    }

    /// Package the buffered tail into a sealed evidence bundle. Failure
    /// here never reverses a block — the caller downgrades to a warning
    /// and uploads metadata without media.
    pub fn extract_clip(
        &mut self,
        audit_ref: &str,
        voter_id: &str,
        election_id: &str,
        reason: &str,
    ) -> Result<EvidenceRecord> {
        std::fs::create_dir_all(&self.cfg.evidence_dir)
            .context("Failed to create evidence directory")?;

        let staging = tempfile::tempdir().context("Failed to create evidence staging dir")?;

        let mut entries: Vec<(PathBuf, String)> = Vec::new();

        if let Some(rate) = self.sample_rate {
            let wav_path = staging.path().join("clip.wav");
            self.write_wav(&wav_path, rate)?;
            entries.push((wav_path, "clip.wav".to_string()));
        } else {
            warn!("No audio buffered for evidence clip {}", audit_ref);
        }

        for (i, frame) in self.frames.iter().enumerate() {
            let name = format!("frame_{:02}.jpg", i);
            let path = staging.path().join(&name);
            std::fs::write(&path, &frame.jpeg).context("Failed to write evidence frame")?;
            entries.push((path, name));
        }

        let meta = json!({
            "auditRef": audit_ref,
            "voterId": voter_id,
            "electionId": election_id,
            "reason": reason,
            "frameCount": self.frames.len(),
            "audioSamples": self.audio.len(),
            "createdAt": Utc::now().to_rfc3339(),
        });
        let meta_path = staging.path().join("meta.json");
        std::fs::write(&meta_path, serde_json::to_vec_pretty(&meta)?)
            .context("Failed to write evidence metadata")?;
        entries.push((meta_path, "meta.json".to_string()));

        let bundle_path = self.cfg.evidence_dir.join(format!("{}.tar.gz", audit_ref));
        write_bundle(&bundle_path, &entries)?;

        let sha256 = digest_file(&bundle_path)?;
        info!(
            "Evidence bundle written: {:?} ({} frames, sha256 {})",
            bundle_path,
            self.frames.len(),
            &sha256[..12]
        );

        let mut meta = meta;
        meta["sha256"] = json!(sha256);

        Ok(EvidenceRecord {
            audit_ref: audit_ref.to_string(),
            voter_id: voter_id.to_string(),
            election_id: election_id.to_string(),
            reason: reason.to_string(),
            bundle_path: Some(bundle_path),
            sha256: Some(sha256),
            meta,
        })
    }

    fn write_wav(&self, path: &Path, sample_rate: u32) -> Result<()> {
        let spec = WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };

        let mut writer = WavWriter::create(path, spec).context("Failed to create evidence WAV")?;
        for &sample in &self.audio {
            writer.write_sample(sample)?;
        }
        writer.finalize().context("Failed to finalize evidence WAV")?;
        Ok(())
    }
}

fn write_bundle(bundle_path: &Path, entries: &[(PathBuf, String)]) -> Result<()> {
    let file = File::create(bundle_path).context("Failed to create evidence bundle")?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for (path, name) in entries {
        builder
            .append_path_with_name(path, name)
            .with_context(|| format!("Failed to add {} to evidence bundle", name))?;
    }

    let encoder = builder.into_inner().context("Failed to finish evidence tar")?;
    encoder.finish().context("Failed to finish evidence gzip")?;
    Ok(())
}

fn digest_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).context("Failed to read evidence bundle for digest")?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(level: f32, samples: usize) -> AudioChunk {
        AudioChunk {
            level,
            samples: vec![0.1; samples],
            sample_rate: 16_000,
        }
    }

    fn frame() -> CapturedFrame {
        CapturedFrame {
            captured_at: Utc::now(),
            jpeg: vec![0xff, 0xd8, 0xff, 0xd9],
            width: 320,
            height: 240,
            detection: None,
        }
    }

    fn recorder(dir: &Path) -> SessionRecorder {
        SessionRecorder::new(RecorderConfig::new(dir.to_path_buf()))
    }

    #[test]
    fn test_audio_buffer_bounded_to_clip_length() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = recorder(dir.path());
        // 10s of audio pushed; only 2s (32000 samples at 16kHz) kept.
        for _ in 0..100 {
            rec.push_audio(&chunk(20.0, 1600));
        }
        assert_eq!(rec.buffered_audio_len(), 32_000);
    }

    #[test]
    fn test_frame_buffer_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = recorder(dir.path());
        for _ in 0..10 {
            rec.push_frame(frame());
        }
        assert_eq!(rec.buffered_frames(), 4);
    }

    #[test]
    fn test_extract_clip_writes_sealed_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = recorder(dir.path());
        rec.push_audio(&chunk(20.0, 8000));
        rec.push_frame(frame());
        rec.push_frame(frame());

        let record = rec
            .extract_clip("audit_v1_e1_123", "v1", "e1", "multiple faces detected")
            .unwrap();

        let bundle = record.bundle_path.as_ref().unwrap();
        assert!(bundle.exists());
        assert!(bundle.to_string_lossy().ends_with("audit_v1_e1_123.tar.gz"));

        let sha = record.sha256.unwrap();
        assert_eq!(sha.len(), 64);
        assert_eq!(record.meta["sha256"], json!(sha));
        assert_eq!(record.meta["voterId"], json!("v1"));
        assert_eq!(record.meta["frameCount"], json!(2));
    }

    #[test]
    fn test_extract_clip_without_audio_still_packages() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = recorder(dir.path());
        rec.push_frame(frame());

        let record = rec
            .extract_clip("audit_v2_e1_456", "v2", "e1", "remote violation")
            .unwrap();
        assert!(record.bundle_path.unwrap().exists());
    }
}
