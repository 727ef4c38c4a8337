use anyhow::Context;
use rc2d::{Pipeline, Settings};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings_file_name = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "settings/default.ron".to_string());
    let settings = Settings::load_or_default(&settings_file_name)
        .with_context(|| format!("loading {settings_file_name}"))?;
    let output_file_name = std::env::args()
        .nth(2)
        .unwrap_or_else(|| settings.output.clone());

    let size = settings.size();
    let scene = settings.scene.render(size).context("building the scene")?;
    let mut pipeline = Pipeline::new(size, settings.cascades, settings.pipeline_options())?;

    let start = std::time::Instant::now();
    let radiance = pipeline.render(&scene)?;
    log::info!(
        "Rendered {} cascades with the {:?} strategy in {:?}",
        settings.cascades.num_cascades,
        pipeline.active_strategy(),
        start.elapsed()
    );

    radiance
        .to_rgba8(settings.color_policy)
        .save(&output_file_name)
        .with_context(|| format!("writing {output_file_name}"))?;
    log::info!("Saved to {}", output_file_name);

    if let Some(raw_output) = &settings.raw_output {
        radiance
            .save_tiff(raw_output)
            .with_context(|| format!("writing {raw_output}"))?;
        log::info!("Saved raw radiance to {}", raw_output);
    }
    Ok(())
}
