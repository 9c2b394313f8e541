//! minibvh CLI - build a BVH over an OBJ model and query it

use std::{
    fs::File,
    io::BufWriter,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Instant,
};

use anyhow::{Context as _, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use image::{Rgba, RgbaImage};
use indicatif::ProgressBar;
use itertools::Itertools as _;
use minibvh::{
    BuildSettings, Bvh, BvhTriangle, Ray, SplitPolicy,
    bvh::{DEFAULT_LEAF_SIZE, DEFAULT_MAX_DEPTH, StackCache},
    geometry::{
        FloatType, WorldPoint, WorldVector,
        wireframe::{LineSegment, box_edges, triangle_edges, write_obj_lines},
    },
    obj::{FaceData, load_obj},
};

#[derive(Parser)]
#[command(name = "minibvh")]
#[command(about = "Build a bounding volume hierarchy over a triangle model and cast rays into it", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print statistics of the built tree
    Stats {
        #[command(flatten)]
        scene: SceneArgs,
        /// Also print the whole tree
        #[arg(long)]
        print_tree: bool,
    },
    /// Cast a single ray and print the closest hit
    Cast {
        #[command(flatten)]
        scene: SceneArgs,
        #[command(flatten)]
        ray: RayArgs,
    },
    /// Export boxes of one tree level, a ray and the triangle it hits as OBJ lines
    Wireframe {
        #[command(flatten)]
        scene: SceneArgs,
        #[command(flatten)]
        ray: RayArgs,
        /// Tree level whose boxes are exported, root is level 0
        #[arg(long, default_value_t = 5)]
        depth: usize,
        /// Length of the exported ray segment
        #[arg(long, default_value_t = 5.0)]
        ray_length: FloatType,
        /// Output OBJ file
        output: PathBuf,
    },
    /// Render a shaded depth image of the model using all CPU cores
    Render {
        #[command(flatten)]
        scene: SceneArgs,
        #[arg(long, default_value_t = 800)]
        width: u32,
        #[arg(long, default_value_t = 600)]
        height: u32,
        /// Horizontal field of view in degrees
        #[arg(long, default_value_t = 50.0)]
        fov: FloatType,
        /// Output PNG file
        output: PathBuf,
    },
}

#[derive(Args)]
struct SceneArgs {
    /// Wavefront OBJ model
    model: PathBuf,
    /// Uniform scale applied to the model's vertices
    #[arg(long, default_value_t = 1.0)]
    scale: FloatType,
    /// Maximum number of triangles in a leaf
    #[arg(long, default_value_t = DEFAULT_LEAF_SIZE)]
    leaf_size: NonZeroUsize,
    #[arg(long, value_enum, default_value_t = Split::Sah)]
    split: Split,
    /// Nodes at this depth become leaves regardless of their size
    #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
    max_depth: usize,
}

#[derive(Args)]
struct RayArgs {
    /// Ray origin as x,y,z
    #[arg(long, value_parser = parse_vector, default_value = "0,0,1", allow_hyphen_values = true)]
    origin: WorldVector,
    /// Ray direction as x,y,z
    #[arg(long, value_parser = parse_vector, default_value = "0.1,-0.1,-0.7", allow_hyphen_values = true)]
    direction: WorldVector,
}

impl RayArgs {
    fn ray(&self) -> Result<Ray> {
        anyhow::ensure!(
            self.direction.norm_squared() > 0.0,
            "Ray direction must be non-zero"
        );
        Ok(Ray::new(self.origin.into(), self.direction))
    }
}

#[derive(Copy, Clone, ValueEnum)]
enum Split {
    Median,
    Sah,
}

impl From<Split> for SplitPolicy {
    fn from(value: Split) -> Self {
        match value {
            Split::Median => SplitPolicy::Median,
            Split::Sah => SplitPolicy::Sah,
        }
    }
}

fn parse_vector(s: &str) -> Result<WorldVector, String> {
    let (x, y, z) = s
        .split(',')
        .map(|c| c.trim().parse::<FloatType>())
        .collect_tuple()
        .ok_or_else(|| format!("Expected three comma separated numbers, got {s:?}"))?;
    let parse_error = |e: std::num::ParseFloatError| e.to_string();
    Ok(WorldVector::new(
        x.map_err(parse_error)?,
        y.map_err(parse_error)?,
        z.map_err(parse_error)?,
    ))
}

struct Scene {
    triangles: Vec<BvhTriangle<FaceData>>,
    bvh: Bvh,
}

impl SceneArgs {
    fn load(&self) -> Result<Scene> {
        let mut triangles = load_obj(&self.model, self.scale)
            .with_context(|| format!("Failed to load {}", self.model.display()))?;

        let settings = BuildSettings::builder()
            .leaf_size(self.leaf_size)
            .split_policy(self.split.into())
            .max_depth(self.max_depth)
            .build();

        let start = Instant::now();
        let bvh = Bvh::build(&mut triangles, &settings);
        log::info!(
            "Built tree over {} triangles in {:.1?}",
            triangles.len(),
            start.elapsed()
        );

        Ok(Scene { triangles, bvh })
    }
}

fn main() -> Result<()> {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Stats { scene, print_tree } => show_stats(&scene.load()?, print_tree)?,
        Commands::Cast { scene, ray } => cast(&scene.load()?, &ray.ray()?),
        Commands::Wireframe {
            scene,
            ray,
            depth,
            ray_length,
            output,
        } => export_wireframe(&scene.load()?, &ray.ray()?, depth, ray_length, &output)?,
        Commands::Render {
            scene,
            width,
            height,
            fov,
            output,
        } => {
            check_render_args(width, height, fov)?;
            render(&scene.load()?, width, height, fov, &output)?
        }
    }

    Ok(())
}

fn show_stats(scene: &Scene, print_tree: bool) -> Result<()> {
    println!("{}", scene.bvh.statistics());
    println!(
        "Bounds: {:?} - {:?}",
        scene.bvh.bounding_box().min,
        scene.bvh.bounding_box().max
    );

    if print_tree {
        let mut tree = String::new();
        scene.bvh.print_tree(&mut tree)?;
        print!("{tree}");
    }

    scene
        .bvh
        .check_consistency(&scene.triangles)
        .context("Built tree is inconsistent")?;

    Ok(())
}

fn cast(scene: &Scene, ray: &Ray) {
    let (hit, stats) = scene.bvh.intersect_with_stats(ray, &scene.triangles);

    match hit.triangle_in(&scene.triangles) {
        Some(triangle) => {
            println!("Hit at distance {}", hit.distance);
            println!("Point: {:?}", hit.point);
            println!("Normal: {:?}", hit.normal);
            println!(
                "Triangle: {:?} (object {})",
                triangle.geometry(),
                triangle.payload.object
            );
        }
        None => println!("Miss"),
    }
    println!("{stats:?}");
}

fn export_wireframe(
    scene: &Scene,
    ray: &Ray,
    depth: usize,
    ray_length: FloatType,
    output: &Path,
) -> Result<()> {
    let boxes = scene.bvh.boxes_at_depth(depth);
    log::info!("{} boxes at depth {depth}", boxes.len());

    let mut segments: Vec<LineSegment> = boxes.iter().flat_map(box_edges).collect();
    segments.push([ray.origin, ray.point_at(ray_length)]);

    let hit = scene.bvh.intersect(ray, &scene.triangles);
    if let Some(triangle) = hit.triangle_in(&scene.triangles) {
        let offset = scene.bvh.bounding_box().size().norm() * 1e-3;
        segments.extend(triangle_edges(triangle.geometry(), offset));
    } else {
        log::warn!("The ray misses the model");
    }

    let file = File::create(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    write_obj_lines(BufWriter::new(file), &segments)?;

    Ok(())
}

/// Pinhole camera looking at the model along -z.
struct Camera {
    center: WorldPoint,
    film_origin_offset: WorldVector,
    pixel_pitch: FloatType,
}

impl Camera {
    fn looking_at(bvh: &Bvh, width: u32, height: u32, fov: FloatType) -> Camera {
        let bounds = bvh.bounding_box();
        let (target, radius) = if bounds.is_empty() {
            (WorldPoint::origin(), 1.0)
        } else {
            (bounds.center(), bounds.size().norm() / 2.0)
        };

        let half_width = (fov.to_radians() / 2.0).tan();
        let distance = radius / half_width + radius;
        let pixel_pitch = 2.0 * half_width / width as FloatType;

        let film_origin_offset = WorldVector::new(
            -half_width + pixel_pitch / 2.0,
            (height as FloatType - 1.0) * pixel_pitch / 2.0,
            -1.0,
        );

        Camera {
            center: target + WorldVector::new(0.0, 0.0, distance),
            film_origin_offset,
            pixel_pitch,
        }
    }

    fn ray(&self, x: u32, y: u32) -> Ray {
        let direction = self.film_origin_offset
            + WorldVector::new(
                x as FloatType * self.pixel_pitch,
                -(y as FloatType) * self.pixel_pitch,
                0.0,
            );
        Ray::new(self.center, direction)
    }
}

fn check_render_args(width: u32, height: u32, fov: FloatType) -> Result<()> {
    anyhow::ensure!(width > 0 && height > 0, "Image size must be non-zero");
    anyhow::ensure!(
        fov > 0.0 && fov < 180.0,
        "Field of view must be between 0 and 180 degrees, got {fov}"
    );
    Ok(())
}

fn render(scene: &Scene, width: u32, height: u32, fov: FloatType, output: &Path) -> Result<()> {
    let camera = Camera::looking_at(&scene.bvh, width, height, fov);
    let image = Mutex::new(RgbaImage::new(width, height));
    let next_row = AtomicUsize::new(0);
    let bar = ProgressBar::new(height as u64);

    let start = Instant::now();
    std::thread::scope(|s| {
        for _ in 0..num_cpus::get() {
            s.spawn(|| {
                let mut stack = StackCache::default();
                let mut row = Vec::with_capacity(width as usize);
                loop {
                    let y = next_row.fetch_add(1, Ordering::Relaxed);
                    if y >= height as usize {
                        break;
                    }
                    let y = y as u32;

                    row.clear();
                    row.extend((0..width).map(|x| {
                        let ray = camera.ray(x, y);
                        let hit = scene.bvh.intersect_with_stack(&ray, &scene.triangles, &mut stack);
                        shade(&ray, hit.is_hit().then_some(hit.normal))
                    }));

                    let mut image = image.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                    for (x, pixel) in row.iter().enumerate() {
                        image.put_pixel(x as u32, y, *pixel);
                    }
                    drop(image);
                    bar.inc(1);
                }
            });
        }
    });
    bar.finish_and_clear();
    log::info!("Rendered {width}x{height} in {:.1?}", start.elapsed());

    image
        .into_inner()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .save(output)
        .with_context(|| format!("Failed to save {}", output.display()))?;

    Ok(())
}

/// Headlight shading, brighter where the surface faces the camera.
fn shade(ray: &Ray, normal: Option<WorldVector>) -> Rgba<u8> {
    match normal {
        Some(normal) => {
            let v = (-normal.dot(&ray.direction)).clamp(0.0, 1.0);
            let v = (40.0 + 215.0 * v) as u8;
            Rgba([v, v, v, 255])
        }
        None => Rgba([0, 0, 0, 255]),
    }
}

#[cfg(test)]
mod test {
    use assert2::assert;
    use test_case::test_case;

    use super::*;

    #[test_case(800, 600, 50.0; "defaults")]
    #[test_case(1, 1, 179.0; "wide")]
    #[test_case(16, 9, 0.5; "narrow")]
    fn render_args_accepted(width: u32, height: u32, fov: FloatType) {
        assert!(check_render_args(width, height, fov).is_ok());
    }

    #[test_case(0, 600, 50.0; "zero width")]
    #[test_case(800, 0, 50.0; "zero height")]
    #[test_case(800, 600, 0.0; "zero fov")]
    #[test_case(800, 600, 180.0; "straight fov")]
    #[test_case(800, 600, -30.0; "negative fov")]
    #[test_case(800, 600, FloatType::NAN; "nan fov")]
    fn render_args_rejected(width: u32, height: u32, fov: FloatType) {
        assert!(check_render_args(width, height, fov).is_err());
    }

    #[test]
    fn parses_vectors() {
        assert!(parse_vector("1, -2,3.5") == Ok(WorldVector::new(1.0, -2.0, 3.5)));
        assert!(parse_vector("1,2").is_err());
        assert!(parse_vector("1,2,x").is_err());
    }
}
