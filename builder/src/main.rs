use dual_tree::data::{rows_to_csv, Matrix, Parser as CsvParser};
use dual_tree::error::{Error, Result};
use dual_tree::model::{KdeModel, KdeParams, NeighborSearchModel, NeighborSearchParams};
use dual_tree::neighbor::sort::SortKind;
use dual_tree::validate::{self, ModelSource};

use glob::glob;
use kdam::tqdm;
use log::{info, warn};

use clap::Parser;
#[derive(Parser, Debug)] #[command(author, version, about, long_about = None)]
struct Args {

    //Which task to carry out: kde, knn or kfn
    #[arg(short, long)]
    task: String,

    //Glob pattern of reference CSV files, concatenated in sorted filename order
    #[arg(short, long)]
    reference: Option<String>,

    //Query CSV file; neighbor search without one queries the reference set with itself
    #[arg(short, long)]
    query: Option<String>,

    //Skip the first line of every CSV file
    #[arg(long)]
    has_header: bool,

    //Previously saved model, instead of a reference set
    #[arg(long)]
    input_model: Option<String>,

    #[arg(long)]
    output_model: Option<String>,

    //Prefix for result files
    #[arg(short, long)]
    output: Option<String>,

    //YAML parameter file; flags below override it
    #[arg(short, long)]
    config: Option<String>,

    #[arg(short, long, allow_negative_numbers = true)]
    k: Option<i64>,

    //naive, single_tree, dual_tree, or greedy for neighbor search
    #[arg(short, long)]
    algorithm: Option<String>,

    #[arg(long)]
    tree_type: Option<String>,

    #[arg(short, long, allow_negative_numbers = true)]
    leaf_size: Option<i64>,

    #[arg(long)]
    kernel: Option<String>,

    #[arg(short, long)]
    bandwidth: Option<f64>,

    #[arg(long, allow_negative_numbers = true)]
    rel_error: Option<f64>,

    #[arg(long, allow_negative_numbers = true)]
    abs_error: Option<f64>,

    #[arg(short, long, allow_negative_numbers = true)]
    epsilon: Option<f64>,

    //Furthest neighbor search only: accept neighbors at least this fraction of the true distance
    #[arg(short, long)]
    percentage: Option<f64>,

    //Neighbor search only: rotate the data into a random orthonormal basis before building trees
    #[arg(long)]
    random_basis: bool,

    #[arg(long)]
    true_neighbors: Option<String>,

    #[arg(long)]
    true_distances: Option<String>,
}

fn main() {

    env_logger::init();

    let args = Args::parse();

    let result = match args.task.as_str() {
        "kde" => run_kde(&args),
        "knn" => run_neighbor_search(&args, SortKind::Nearest),
        "kfn" => run_neighbor_search(&args, SortKind::Furthest),
        _ => Err(Error::invalid(format!("unknown task: {}", args.task))),
    };

    if let Err(e) = result {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn load_matrices(pattern: &str, has_header: bool) -> Result<Matrix> {

    let paths = match glob(pattern) {
        Ok(x) => x,
        Err(e) => return Err(Error::invalid(format!("bad glob pattern {}: {}", pattern, e))),
    };

    let mut filenames: Vec<String> = Vec::new();
    for path in paths {
        match path {
            Ok(x) => filenames.push(x.to_string_lossy().to_string()),
            Err(e) => return Err(Error::Io(e.into_error())),
        }
    }
    filenames.sort();

    let mut matrix: Option<Matrix> = None;
    for filename in tqdm!(filenames.iter()) {
        let part = CsvParser::read_csv(filename, has_header)?;
        info!("{}: {} points in {} dimensions", filename, part.num_points(), part.dims());

        match matrix.as_mut() {
            None => matrix = Some(part),
            Some(m) => m.append(&part)?,
        }
    }

    match matrix {
        Some(x) => Ok(x),
        None => Err(Error::invalid(format!("no files match {}", pattern))),
    }
}

/// Rows of a CSV file, one per query.
fn load_rows(filename: &str, has_header: bool) -> Result<Vec<Vec<f64>>> {

    let matrix = CsvParser::read_csv(filename, has_header)?;

    return Ok((0..matrix.num_points()).map(|i| matrix.col(i).to_vec()).collect());
}

fn load_index_rows(filename: &str, has_header: bool) -> Result<Vec<Vec<usize>>> {

    let rows = load_rows(filename, has_header)?;

    let mut out: Vec<Vec<usize>> = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        let mut indices: Vec<usize> = Vec::with_capacity(row.len());
        for value in row.iter() {
            if *value < 0.0 || value.fract() != 0.0 {
                return Err(Error::Parse { line: i + 1, message: format!("{} is not a point index", value) });
            }
            indices.push(*value as usize);
        }
        out.push(indices);
    }

    return Ok(out);
}

/// Flags that only shape a model being trained.
fn warn_ignored(flags: &[(&str, bool)]) {

    for (name, given) in flags {
        if *given {
            warn!("--{} is ignored when a model is loaded with --input_model", name);
        }
    }
}

fn write_output(prefix: &str, suffix: &str, contents: String) -> Result<()> {

    let filename = format!("{}{}", prefix, suffix);
    std::fs::write(&filename, contents)?;
    info!("wrote {}", filename);

    Ok(())
}

fn kde_params(args: &Args) -> Result<KdeParams> {

    let mut params = match &args.config {
        Some(filename) => KdeParams::from_file(filename)?,
        None => KdeParams::default(),
    };

    if let Some(x) = &args.kernel {
        params.kernel = x.parse()?;
    }
    if let Some(x) = args.bandwidth {
        params.bandwidth = validate::check_bandwidth(x)?;
    }
    if let Some(x) = args.rel_error {
        params.relative_error = validate::check_relative_error(x)?;
    }
    if let Some(x) = args.abs_error {
        params.absolute_error = validate::check_absolute_error(x)?;
    }
    if let Some(x) = &args.algorithm {
        params.algorithm = x.parse()?;
    }
    if let Some(x) = &args.tree_type {
        params.tree_type = x.parse()?;
    }
    if let Some(x) = args.leaf_size {
        params.leaf_size = validate::check_leaf_size(x)?;
    }

    params.validate()?;

    return Ok(params);
}

fn run_kde(args: &Args) -> Result<()> {

    let source = validate::check_model_source(args.input_model.as_deref(), args.reference.as_deref())?;

    let mut model = match source {
        ModelSource::Saved(filename) => {
            warn_ignored(&[
                ("config", args.config.is_some()),
                ("kernel", args.kernel.is_some()),
                ("bandwidth", args.bandwidth.is_some()),
                ("tree_type", args.tree_type.is_some()),
                ("leaf_size", args.leaf_size.is_some()),
            ]);
            KdeModel::load(filename)?
        },
        ModelSource::Reference(pattern) => {
            let params = kde_params(args)?;
            dbg!(&params);
            let mut model = KdeModel::new(&params)?;
            model.train(load_matrices(pattern, args.has_header)?)?;
            model
        },
    };

    //settings that do not change the tree may be overridden on a loaded model
    if let ModelSource::Saved(_) = source {
        if let Some(x) = &args.algorithm {
            let algorithm = x.parse()?;
            validate::check_kde_algorithm(algorithm)?;
            model.set_algorithm(algorithm);
        }
        if let Some(x) = args.rel_error {
            model.set_relative_error(x)?;
        }
        if let Some(x) = args.abs_error {
            model.set_absolute_error(x)?;
        }
    }

    if let Some(filename) = &args.query {
        let query = CsvParser::read_csv(filename, args.has_header)?;
        let (densities, stats) = model.evaluate_with_stats(&query)?;
        info!("{} base cases, {} scores, {} prunes", stats.base_cases, stats.scores, stats.prunes);

        if let Some(prefix) = &args.output {
            let rows: Vec<Vec<f64>> = densities.into_iter().map(|x| vec![x]).collect();
            write_output(prefix, "_densities.csv", rows_to_csv(&rows))?;
        }
    }

    if let Some(filename) = &args.output_model {
        model.save(filename)?;
        info!("saved model to {}", filename);
    }

    Ok(())
}

fn neighbor_search_params(args: &Args, sort: SortKind) -> Result<NeighborSearchParams> {

    let mut params = match &args.config {
        Some(filename) => NeighborSearchParams::from_file(filename)?,
        None => NeighborSearchParams::default(),
    };
    params.sort = sort;

    if let Some(x) = &args.algorithm {
        params.algorithm = x.parse()?;
    }
    if let Some(x) = &args.tree_type {
        params.tree_type = x.parse()?;
    }
    if let Some(x) = args.leaf_size {
        params.leaf_size = validate::check_leaf_size(x)?;
    }
    if let Some(x) = epsilon_override(args, sort)? {
        params.epsilon = x;
    }
    if args.random_basis {
        params.random_basis = true;
    }

    params.validate()?;

    return Ok(params);
}

fn epsilon_override(args: &Args, sort: SortKind) -> Result<Option<f64>> {

    match (args.epsilon, args.percentage, sort) {
        (Some(_), Some(_), _) => Err(Error::invalid("only one of epsilon and percentage may be given")),
        (None, Some(_), SortKind::Nearest) => Err(Error::invalid("percentage only applies to furthest neighbor search")),
        (None, Some(p), SortKind::Furthest) => Ok(Some(validate::check_percentage(p)?)),
        (Some(e), None, _) => Ok(Some(validate::check_epsilon(e, sort == SortKind::Furthest)?)),
        (None, None, _) => Ok(None),
    }
}

fn run_neighbor_search(args: &Args, sort: SortKind) -> Result<()> {

    let source = validate::check_model_source(args.input_model.as_deref(), args.reference.as_deref())?;

    let mut model = match source {
        ModelSource::Saved(filename) => {
            warn_ignored(&[
                ("config", args.config.is_some()),
                ("tree_type", args.tree_type.is_some()),
                ("leaf_size", args.leaf_size.is_some()),
                ("random_basis", args.random_basis),
            ]);
            NeighborSearchModel::load(filename)?
        },
        ModelSource::Reference(pattern) => {
            let params = neighbor_search_params(args, sort)?;
            dbg!(&params);
            let mut model = NeighborSearchModel::new(&params)?;
            model.train(load_matrices(pattern, args.has_header)?)?;
            model
        },
    };

    if let ModelSource::Saved(_) = source {
        if model.params().sort != sort {
            return Err(Error::InvalidState(format!("model performs {:?} search, task asks for {:?}", model.params().sort, sort)));
        }
        if let Some(x) = &args.algorithm {
            model.set_algorithm(x.parse()?);
        }
        if let Some(x) = epsilon_override(args, sort)? {
            model.set_epsilon(x)?;
        }
    }

    if let Some(k) = args.k {

        let num_references = model.num_references().unwrap_or(0);

        let (result, stats) = match &args.query {
            Some(filename) => {
                let query = CsvParser::read_csv(filename, args.has_header)?;
                let k = validate::check_k(k, num_references, false)?;
                model.search_with_stats(&query, k)?
            },
            None => {
                let k = validate::check_k(k, num_references, true)?;
                model.search_self_with_stats(k)?
            },
        };
        info!("{} base cases, {} scores, {} prunes", stats.base_cases, stats.scores, stats.prunes);

        if let Some(filename) = &args.true_distances {
            let true_distances = load_rows(filename, false)?;
            info!("effective error: {}", result.effective_error(&true_distances)?);
        }

        if let Some(filename) = &args.true_neighbors {
            let true_neighbors = load_index_rows(filename, false)?;
            info!("recall: {}", result.recall(&true_neighbors)?);
        }

        if let Some(prefix) = &args.output {
            write_output(prefix, "_neighbors.csv", rows_to_csv(&result.neighbors))?;
            write_output(prefix, "_distances.csv", rows_to_csv(&result.distances))?;
        }
    } else if args.query.is_some() || args.output.is_some() {
        return Err(Error::invalid("k must be given to search"));
    }

    if let Some(filename) = &args.output_model {
        model.save(filename)?;
        info!("saved model to {}", filename);
    }

    Ok(())
}
