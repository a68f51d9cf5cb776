//! Weighted stippling demonstration for rust_voronoi_stipple
//!
//! Relaxes generators over a radial gradient and prints the stipples.
//! Pass an image path with the `image` feature enabled to stipple a picture.

use rust_voronoi_stipple::*;

fn gradient_density(size: usize) -> Result<DensityField> {
    let center = (size as f32 - 1.0) * 0.5;
    let mut pixels = Vec::with_capacity(size * size);
    for y in 0..size {
        for x in 0..size {
            let d = Vec2::new(x as f32 - center, y as f32 - center).length() / center;
            let shade = (d.min(1.0) * 255.0) as u8;
            pixels.push([shade, shade, shade]);
        }
    }
    DensityField::from_rgb(size, size, &pixels)
}

#[cfg(feature = "image")]
fn load_density() -> Result<DensityField> {
    match std::env::args().nth(1) {
        Some(path) => DensityField::from_image_path(path),
        None => gradient_density(128),
    }
}

#[cfg(not(feature = "image"))]
fn load_density() -> Result<DensityField> {
    gradient_density(128)
}

fn main() -> Result<()> {
    println!("=== rust_voronoi_stipple Demo ===\n");

    // Step 1: Configure engine
    println!("Step 1: Configuring engine...");
    let config = EngineConfigBuilder::new()
        .seed(12345)
        .num_regions(1024)?
        .image_size(256, 256)?
        .max_chunk_size(256)?
        .weighted(true)
        .lloyd_iterations(40)
        .build()?;

    println!("  Seed: {}", config.seed);
    println!("  Regions: {} (chunks of {})", config.num_regions, config.max_chunk_size);
    println!("  Image: {}x{} ({} pixels)", config.image_width, config.image_height, config.pixel_count());

    // Step 2: Build density and engine
    println!("\nStep 2: Loading density...");
    let density = load_density()?;
    let rasterizer = NearestGeneratorRasterizer::from_config(&config);
    let mut engine = PartitionEngine::initialize(config, rasterizer, Some(density))?;

    // Step 3: Relax with progress
    println!("\nStep 3: Relaxing...");
    let options = config.lloyd_options();
    let threshold = options.convergence_threshold * config.domain.extent();
    for _ in 0..options.max_iterations {
        let report = engine.step()?;
        println!(
            "  iter {:>3}: max_disp {:.5}, energy {:.5}, empty {}, raster {:?}, aggregate {:?}",
            report.iteration,
            report.max_displacement,
            report.centroid_energy,
            report.empty_regions,
            report.rasterize_time,
            report.aggregate_time
        );
        if report.max_displacement < threshold {
            println!("  converged");
            break;
        }
    }

    // Step 4: Stipples
    println!("\nStep 4: Stipples (first 10):");
    let radii = engine.stipple_radii();
    for (generator, radius) in engine.generators().iter().zip(&radii).take(10) {
        println!("  #{:<4} at ({:+.4}, {:+.4}) r={:.4}", generator.id, generator.position.x, generator.position.y, radius);
    }
    let mean_radius = radii.iter().sum::<f32>() / radii.len() as f32;
    println!("  mean radius: {:.4}", mean_radius);

    engine.dispose();
    println!("\n=== Demo Complete ===");
    Ok(())
}
