//! Command-line front end: load a height field, refine, export.
//!
//! Exit codes: 0 on success, 1 on malformed input, 2 on a configuration
//! error.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::info;

use tinfit::{mesh, Config, Criterion, Simplifier, SvgOptions};

#[derive(Parser)]
#[command(name = "tinfit", version, about = "Simplify a gridded height field into a TIN")]
struct Args {
    /// STM height field: ASCII `width height` header, then big-endian
    /// 16-bit samples (65535 marks no data)
    stm: PathBuf,

    /// RGB texture with the same dimensions as the grid
    #[arg(long)]
    texture: Option<PathBuf>,

    /// Write the simplified mesh as Wavefront OBJ
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write an SVG wireframe of the triangulation
    #[arg(long)]
    svg: Option<PathBuf>,

    /// Color weight in [0, 1]; 0 ignores color
    #[arg(long, default_value_t = 0.0)]
    emphasis: f64,

    /// Data-dependent triangulation instead of incremental Delaunay
    #[arg(long)]
    datadep: bool,

    /// Blend between data-dependent (0) and shape-dependent (1) swaps
    #[arg(long, default_value_t = 0.5)]
    qual_thresh: f64,

    /// Error criterion: suminf, maxinf, sum2, or abn
    #[arg(long, default_value = "suminf")]
    criterion: String,

    /// Supersampling trigger; 0 always supersamples, 1e30 never
    #[arg(long, default_value_t = 1e30)]
    area_thresh: f64,

    /// Maximum number of vertices to insert
    #[arg(long, default_value_t = 1000)]
    limit: usize,

    /// Stop once the worst candidate error drops below this
    #[arg(long, default_value_t = 0.0)]
    thresh: f64,

    /// Sliver penalty weight for data-dependent swaps
    #[arg(long, default_value_t = 0.0)]
    alpha: f64,

    /// Multi-insertion extension (not implemented; rejected if set)
    #[arg(long)]
    parallel_insert: bool,

    #[arg(long)]
    multinsert: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let criterion: Criterion = match args.criterion.parse() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("tinfit: {}", e);
            return ExitCode::from(2);
        }
    };

    let hf = match tinfit::io::load(&args.stm, args.texture.as_deref()) {
        Ok(hf) => hf,
        Err(e) => {
            eprintln!("tinfit: {}: {}", args.stm.display(), e);
            return ExitCode::from(1);
        }
    };
    info!(
        "loaded {}x{} field, elevation range [{}, {}]",
        hf.width(),
        hf.height(),
        hf.zmin(),
        hf.zmax()
    );

    let config = Config {
        emphasis: args.emphasis,
        datadep: args.datadep,
        qual_thresh: args.qual_thresh,
        criterion,
        area_thresh: args.area_thresh,
        limit: args.limit,
        thresh: args.thresh,
        alpha: args.alpha,
        parallel_insert: args.parallel_insert,
        multinsert: args.multinsert,
    };

    let mut simplifier = match Simplifier::new(&hf, config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("tinfit: {}", e);
            return ExitCode::from(2);
        }
    };

    let inserted = match simplifier.select_new_points(args.limit) {
        Ok(n) => n,
        Err(e) => {
            eprintln!("tinfit: {}", e);
            return ExitCode::from(2);
        }
    };

    let (v, _, f) = simplifier.subdivision().counts();
    let (rms, max) = simplifier.field_errors();
    let stats = simplifier.stats();
    info!(
        "scanned {} triangles ({} supersampled), visited {} samples",
        stats.nscan, stats.nsuper, stats.scancount
    );
    println!(
        "{} vertices inserted: {} vertices, {} triangles, rms error {:.3}, max error {:.3}",
        inserted, v, f, rms, max
    );

    let tris = mesh::extract(simplifier.subdivision(), &hf);
    if let Some(path) = &args.output {
        let result = File::create(path).map(BufWriter::new).and_then(|mut w| {
            mesh::write_obj(&mut w, &tris)?;
            w.flush()
        });
        if let Err(e) = result {
            eprintln!("tinfit: {}: {}", path.display(), e);
            return ExitCode::from(1);
        }
        info!("wrote {}", path.display());
    }

    if let Some(path) = &args.svg {
        let aspect = (hf.height() - 1) as f64 / (hf.width() - 1) as f64;
        let doc = mesh::wireframe_svg(
            simplifier.subdivision(),
            &hf,
            &SvgOptions {
                width: 1024.0,
                height: 1024.0 * aspect,
            },
        );
        if let Err(e) = svg::save(path, &doc) {
            eprintln!("tinfit: {}: {}", path.display(), e);
            return ExitCode::from(1);
        }
        info!("wrote {}", path.display());
    }

    ExitCode::SUCCESS
}
