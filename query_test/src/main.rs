use dual_tree::data::Matrix;
use dual_tree::error::{Error, Result};
use dual_tree::model::{KdeModel, NeighborSearchModel};
use dual_tree::traversal::Algorithm;

use kdam::tqdm;
use log::info;
use std::time::Instant;

use clap::Parser;
#[derive(Parser, Debug)] #[command(author, version, about, long_about = None)]
struct Args {

    //Which kind of model to load: kde or neighbor_search
    #[arg(short, long)]
    task: String,

    //Saved model file
    #[arg(short, long)]
    model: String,

    //Neighbors per query for neighbor search models
    #[arg(short, long, default_value_t = 10)]
    k: usize,

    //Repetitions per query set size and algorithm
    #[arg(short, long, default_value_t = 10)]
    repeats: usize,
}

const QUERY_SIZES: [usize; 4] = [1, 10, 100, 1000];
const ALGORITHMS: [Algorithm; 3] = [Algorithm::Naive, Algorithm::SingleTree, Algorithm::DualTree];

fn main() {

    env_logger::init();

    let args = Args::parse();
    dbg!(&args);

    let result = match args.task.as_str() {
        "kde" => kde_sweep(&args),
        "neighbor_search" => neighbor_search_sweep(&args),
        _ => Err(Error::invalid(format!("unknown task: {}", args.task))),
    };

    if let Err(e) = result {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn kde_sweep(args: &Args) -> Result<()> {

    let mut model = KdeModel::load(&args.model)?;
    let dims = match model.dims() {
        Some(x) => x,
        None => return Err(Error::NotTrained),
    };

    let mut rng = rand::thread_rng();

    for algorithm in ALGORITHMS {
        model.set_algorithm(algorithm);

        for num_queries in QUERY_SIZES {
            for _ in tqdm!(0..args.repeats) {

                let query = Matrix::random(dims, num_queries, &mut rng);

                let start = Instant::now();

                let (_, stats) = model.evaluate_with_stats(&query)?;

                let duration = start.elapsed();

                info!("{:?} {}: {} ({} base cases, {} prunes)", algorithm, num_queries, duration.as_secs_f64(), stats.base_cases, stats.prunes);
            }
        }
    }

    Ok(())
}

fn neighbor_search_sweep(args: &Args) -> Result<()> {

    let mut model = NeighborSearchModel::load(&args.model)?;
    let dims = match model.dims() {
        Some(x) => x,
        None => return Err(Error::NotTrained),
    };

    let mut rng = rand::thread_rng();

    for algorithm in ALGORITHMS {
        model.set_algorithm(algorithm);

        for num_queries in QUERY_SIZES {
            for _ in tqdm!(0..args.repeats) {

                let query = Matrix::random(dims, num_queries, &mut rng);

                let start = Instant::now();

                let (_, stats) = model.search_with_stats(&query, args.k)?;

                let duration = start.elapsed();

                info!("{:?} {} x {}: {} ({} base cases, {} prunes)", algorithm, num_queries, args.k, duration.as_secs_f64(), stats.base_cases, stats.prunes);
            }
        }
    }

    Ok(())
}
