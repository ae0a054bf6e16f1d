/// Synthetic scenario generator: writes a seeded, internally consistent
/// pipeline input (mapping, fine land tensor, crop and forestry splits,
/// pasture fractions, intactness coefficients) for trial runs and timing.
///
/// Coarse children are drawn as random shares of the cluster aggregate of the
/// fine parent, so a run over the result must conserve every parent total.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use rand::{rngs::StdRng, Rng, SeedableRng};

use landsplit_core::{
    AggregationMode, CoefficientField, LandScheme, MappingRow, PhysicalUnit, PipelineInputs,
    QuantityField, SpatialMapping, SplitPass,
};

const CROP_TYPES: [&str; 5] = ["maiz", "rice", "soyb", "tece", "begr"];
const FORESTRY_TYPES: [&str; 3] = ["plant", "ndc", "aff"];

/// Intactness coefficients for every category a full run can produce.
const INTACTNESS: [(&str, f64); 14] = [
    ("maiz", 0.35),
    ("rice", 0.35),
    ("soyb", 0.35),
    ("tece", 0.35),
    ("begr", 0.4),
    ("pastr", 0.5),
    ("range", 0.7),
    ("plant", 0.55),
    ("ndc", 0.75),
    ("aff", 0.75),
    ("primforest", 1.0),
    ("secdforest", 0.8),
    ("urban", 0.3),
    ("other", 0.9),
];

#[derive(Parser, Debug)]
#[command(name = "synth_scenario", about = "Write a seeded synthetic disaggregation scenario")]
struct Args {
    /// Number of clusters.
    #[arg(long, default_value = "20")]
    clusters: usize,

    /// Grid cells per cluster.
    #[arg(long, default_value = "50")]
    cells_per_cluster: usize,

    /// Comma-separated time steps.
    #[arg(long, value_delimiter = ',', default_value = "2020,2030,2040,2050")]
    years: Vec<i32>,

    /// Category layout of the land tensor (grass-split or no-grass).
    #[arg(long, default_value = "grass-split")]
    scheme: LandScheme,

    #[arg(long, default_value = "42")]
    seed: u64,

    /// Output scenario JSON file.
    #[arg(short, long, default_value = "data/scenario.json")]
    output: PathBuf,
}

/// Random composition that sums to `total`.
fn random_shares(rng: &mut StdRng, n: usize) -> Vec<f64> {
    let raw: Vec<f64> = (0..n).map(|_| rng.gen_range(0.05..1.0)).collect();
    let sum: f64 = raw.iter().sum();
    raw.into_iter().map(|v| v / sum).collect()
}

fn build_mapping(rng: &mut StdRng, clusters: usize, cells_per_cluster: usize) -> Result<SpatialMapping> {
    let rows = (0..clusters).flat_map(|k| (0..cells_per_cluster).map(move |i| (k, i)));
    let rows: Vec<MappingRow> = rows
        .map(|(k, i)| MappingRow::new(format!("c{k:03}"), format!("c{k:03}.{i:04}"), rng.gen_range(0.5..1.0)))
        .collect();
    Ok(SpatialMapping::from_rows(rows)?)
}

fn build_land(rng: &mut StdRng, mapping: &SpatialMapping, years: &[i32], scheme: LandScheme) -> Result<QuantityField> {
    let categories = scheme.internal_categories();
    let mut land = QuantityField::zeros(
        mapping.cells().to_vec(),
        categories.clone(),
        years.to_vec(),
        PhysicalUnit::MhaPerCell,
    )?;
    for cell in mapping.cells() {
        // Cell area in Mha scales with the mapping weight.
        let area = mapping.weight(cell).unwrap_or(1.0) * 0.25;
        let base = random_shares(rng, categories.len());
        for (step, &year) in years.iter().enumerate() {
            // Crop expands into "other" over time.
            let drift = (step as f64 * 0.01).min(base[categories.len() - 1]);
            for (c, cat) in categories.iter().enumerate() {
                let share = match cat.as_str() {
                    "crop" => base[c] + drift,
                    "other" => base[c] - drift,
                    _ => base[c],
                };
                land.set(cell, cat, year, share * area)?;
            }
        }
    }
    Ok(land)
}

fn build_split(
    rng: &mut StdRng,
    name: &str,
    parent: &str,
    children: &[&str],
    land: &QuantityField,
    mapping: &SpatialMapping,
) -> Result<SplitPass> {
    let coarse = mapping.aggregate(&land.category(parent)?, AggregationMode::Sum)?;
    let mut children_coarse = QuantityField::zeros(
        mapping.clusters().to_vec(),
        children.iter().map(|c| c.to_string()).collect(),
        land.times().to_vec(),
        PhysicalUnit::Mha,
    )?;
    for cluster in mapping.clusters() {
        let shares = random_shares(rng, children.len());
        for &year in land.times() {
            let total = coarse.get(cluster, parent, year).unwrap_or(0.0);
            for (child, s) in children.iter().zip(&shares) {
                children_coarse.set(cluster, child, year, total * s)?;
            }
        }
    }
    Ok(SplitPass { name: name.to_string(), parent: parent.to_string(), children_coarse })
}

fn build_pasture_fractions(rng: &mut StdRng, mapping: &SpatialMapping, year: i32) -> Result<QuantityField> {
    let mut f = QuantityField::zeros(
        mapping.cells().to_vec(),
        vec!["pastr".to_string(), "range".to_string()],
        vec![year],
        PhysicalUnit::Fraction,
    )?;
    for cluster in mapping.clusters() {
        // Regional fraction: one value per cluster.
        let managed = rng.gen_range(0.1..0.6);
        for (cell, _) in mapping.members(cluster) {
            f.set(cell, "pastr", year, managed)?;
            f.set(cell, "range", year, 1.0 - managed)?;
        }
    }
    Ok(f)
}

fn build_scenario(args: &Args) -> Result<PipelineInputs> {
    if args.clusters == 0 || args.cells_per_cluster == 0 {
        bail!("clusters and cells-per-cluster must be positive");
    }
    if args.years.is_empty() {
        bail!("at least one year is required");
    }
    let mut rng = StdRng::seed_from_u64(args.seed);
    let mapping = build_mapping(&mut rng, args.clusters, args.cells_per_cluster)?;
    let land = build_land(&mut rng, &mapping, &args.years, args.scheme)?;
    let crop = build_split(&mut rng, "crop_types", "crop", &CROP_TYPES, &land, &mapping)?;
    let forestry = build_split(&mut rng, "forestry_types", "forestry", &FORESTRY_TYPES, &land, &mapping)?;
    let pasture_fractions = build_pasture_fractions(&mut rng, &mapping, args.years[0])?;

    Ok(PipelineInputs {
        mapping,
        land,
        splits: vec![crop, forestry],
        pasture_fractions: Some(pasture_fractions),
        intactness: Some(CoefficientField::uniform(&INTACTNESS)),
    })
}

fn main() -> Result<()> {
    let args = Args::parse();
    let scenario = build_scenario(&args)?;

    if let Some(dir) = args.output.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let json = serde_json::to_string(&scenario)?;
    fs::write(&args.output, json).with_context(|| format!("writing {}", args.output.display()))?;

    eprintln!(
        "[synth_scenario] {} clusters × {} cells, {} years → {}",
        args.clusters,
        args.cells_per_cluster,
        args.years.len(),
        args.output.display()
    );
    Ok(())
}
