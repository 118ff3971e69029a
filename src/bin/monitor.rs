use anyhow::Result;
use std::time::Instant;

use vitalmotion::camera::ThreadedCamera;
use vitalmotion::config::Config;
use vitalmotion::detection::{DetectionLoop, FramePump, IntervalPump};
use vitalmotion::model::{ModelManager, OnnxBackend};

const CONFIG_PATH: &str = "config.toml";

fn format_score(value: Option<f32>) -> String {
    match value {
        Some(v) => format!("{:.0}", v),
        None => "--".to_string(),
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let config = Config::load_or_default(CONFIG_PATH);

    println!("Motion Monitor ({})", env!("GIT_VERSION"));
    println!("Press Ctrl+C to exit");

    // カメラを開く
    println!("Opening camera {}...", config.camera.index);
    let mut camera =
        ThreadedCamera::start(config.camera.index, config.camera.width, config.camera.height)?;
    let (width, height) = camera.resolution();
    println!("Camera resolution: {}x{}", width, height);

    // モデルを読み込む
    println!("Loading model from {}...", config.model.model_path);
    let backend = OnnxBackend::new(&config.model.model_path);
    let mut manager = ModelManager::new(Box::new(backend), config.model.clone());
    if !manager.load() {
        anyhow::bail!(
            "model failed to load after {} attempts",
            config.model.max_load_attempts
        );
    }
    println!("Model ready");

    let mut session = DetectionLoop::new(manager, &config.detection);
    session.start()?;

    let mut pump = IntervalPump::from_fps(config.detection.target_fps);
    let mut last_report = Instant::now();

    // メインループ
    while pump.next_frame() {
        session.tick(&mut camera);

        // 1秒ごとに状態を表示
        if last_report.elapsed().as_secs_f32() >= 1.0 {
            let status = session.status();
            println!(
                "FPS: {:.1}, confidence: {:.2}, keypoints: {}",
                status.fps.unwrap_or(0.0),
                status.confidence.unwrap_or(0.0),
                status.detected_keypoints
            );
            if let Some(angles) = session.angles() {
                println!(
                    "  knee: {}  hip: {}  shoulder: {}  elbow: {}  ankle: {}  neck: {}",
                    format_score(angles.knee),
                    format_score(angles.hip),
                    format_score(angles.shoulder),
                    format_score(angles.elbow),
                    format_score(angles.ankle),
                    format_score(angles.neck),
                );
            }
            if let Some(biomarkers) = session.biomarkers() {
                println!(
                    "  posture: {}  rom: {}  stability: {}  quality: {}",
                    format_score(biomarkers.posture_score),
                    format_score(biomarkers.range_of_motion),
                    format_score(biomarkers.stability_score),
                    format_score(biomarkers.movement_quality),
                );
            }
            last_report = Instant::now();
        }
    }

    session.stop();
    println!("Shutting down...");
    Ok(())
}
