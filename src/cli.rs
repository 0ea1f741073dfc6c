//! Command-line front door: one `clap::Subcommand` per action alias plus
//! `lookup`. This is deliberately thin — it builds an `ActionTree` and hands
//! it to `driver::Driver`, rather than reimplementing the bracketed-token
//! operation language itself (that tokenizer and its help text are out of
//! scope).

use crate::action::{self, ActionKind, ActionTemplate, ActionTree, InputRef};
use crate::config::RunConfig;
use crate::database::Database;
use crate::driver::{choose_block_prefix_width, Driver};
use crate::kmer::Strand;
use crate::printer::Printer;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "meryl", author, version, about = "K-mer counting and set-algebra engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Mer size shared by every input/output in this invocation.
    #[arg(short = 'k', long, global = true, default_value_t = 21)]
    pub k: u32,

    /// Label width in bits (0 disables labels).
    #[arg(long, global = true, default_value_t = 0)]
    pub label_width: u32,

    /// Worker thread budget; 0 lets rayon choose.
    #[arg(short = 't', long, global = true, default_value_t = 0)]
    pub threads: usize,

    /// Memory budget, in bytes, for the counting pass.
    #[arg(long, global = true, default_value_t = 1 << 30)]
    pub memory: u64,
}

#[derive(Subcommand)]
pub enum Command {
    /// Count canonical k-mers from sequence input into a new database.
    Count {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        #[arg(short, long)]
        output: PathBuf,
        /// Which strand(s) to emit: forward-only, reverse-only, or the
        /// canonical (lexicographically smaller) form.
        #[arg(long, value_enum, default_value_t = StrandArg::Canonical)]
        strand: StrandArg,
        /// Restrict output to k-mers ending in this base sequence.
        #[arg(long)]
        count_suffix: Option<String>,
    },
    /// Union of two or more databases: present in any, value = count, label = OR.
    Union {
        #[arg(required = true, num_args = 2..)]
        inputs: Vec<PathBuf>,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long, value_enum, default_value_t = Combine::Count)]
        combine: Combine,
    },
    /// Intersection of two or more databases: present in all, value = first, label = AND.
    Intersect {
        #[arg(required = true, num_args = 2..)]
        inputs: Vec<PathBuf>,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long, value_enum, default_value_t = Combine::First)]
        combine: Combine,
    },
    /// Subtracts the value of every other input from the first input's value.
    Subtract {
        #[arg(required = true, num_args = 2..)]
        inputs: Vec<PathBuf>,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// K-mers present in the first input and no other.
    Difference {
        #[arg(required = true, num_args = 2..)]
        inputs: Vec<PathBuf>,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Keeps k-mers whose value meets a threshold.
    Filter {
        #[arg(required = true)]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long)]
        at_least: Option<u32>,
        #[arg(long)]
        at_most: Option<u32>,
    },
    /// Emits a value histogram as tab-separated text.
    Histogram { input: PathBuf },
    /// Emits summary statistics as JSON.
    Statistics { input: PathBuf },
    /// Prints every k-mer in a database as tab-separated text.
    Print {
        input: PathBuf,
        /// Output path; `#`-runs fan out into one file per slice.
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Looks up a single k-mer's value/label in a database.
    Lookup { database: PathBuf, kmer: String },
}

#[derive(Clone, Copy, clap::ValueEnum)]
pub enum Combine {
    Count,
    First,
    Min,
    Max,
    Sum,
}

#[derive(Clone, Copy, clap::ValueEnum)]
pub enum StrandArg {
    Forward,
    Reverse,
    Canonical,
}

impl From<StrandArg> for Strand {
    fn from(arg: StrandArg) -> Self {
        match arg {
            StrandArg::Forward => Strand::Forward,
            StrandArg::Reverse => Strand::Reverse,
            StrandArg::Canonical => Strand::Canonical,
        }
    }
}

pub fn run(cli: Cli) -> Result<()> {
    let config = RunConfig::new(cli.k, cli.label_width, cli.memory, cli.threads)
        .context("invalid configuration")?;

    match cli.command {
        Command::Count {
            inputs,
            output,
            strand,
            count_suffix,
        } => {
            let mut tree = ActionTree::new();
            let mut node = ActionTemplate::new(ActionKind::Counting);
            for path in inputs {
                node = node.with_input(InputRef::Sequence(path));
            }
            let root = tree.push(node);
            let mut config = config.with_strand(strand.into());
            if let Some(suffix) = count_suffix {
                let width = suffix.len() as u32 * 2;
                let value = crate::kmer::string_to_packed(suffix.len() as u32, suffix.as_bytes())
                    .with_context(|| format!("{suffix:?} is not a valid base sequence"))?;
                config = config.with_count_suffix(width, value);
            }
            write_database(&tree, root, &config, &output)?;
        }
        Command::Union {
            inputs,
            output,
            combine,
        } => {
            let mut tree = ActionTree::new();
            let refs = database_inputs(&inputs);
            let node = match combine {
                Combine::Min => action::union_min(refs),
                Combine::Max => action::union_max(refs),
                Combine::Sum => action::union_sum(refs),
                // `union`'s natural value rule is Count; First has no
                // meaningful distinction for a symmetric union.
                Combine::Count | Combine::First => action::union(refs),
            };
            let root = tree.push(node);
            write_database(&tree, root, &config, &output)?;
        }
        Command::Intersect {
            inputs,
            output,
            combine,
        } => {
            let mut tree = ActionTree::new();
            let refs = database_inputs(&inputs);
            let node = match combine {
                Combine::Min => action::intersect_min(refs),
                Combine::Max => action::intersect_max(refs),
                Combine::Sum => action::intersect_sum(refs),
                Combine::Count | Combine::First => action::intersect(refs),
            };
            let root = tree.push(node);
            write_database(&tree, root, &config, &output)?;
        }
        Command::Subtract { inputs, output } => {
            let mut tree = ActionTree::new();
            let node = action::subtract(database_inputs(&inputs));
            let root = tree.push(node);
            write_database(&tree, root, &config, &output)?;
        }
        Command::Difference { inputs, output } => {
            let mut tree = ActionTree::new();
            let node = action::difference(database_inputs(&inputs));
            let root = tree.push(node);
            write_database(&tree, root, &config, &output)?;
        }
        Command::Filter {
            input,
            output,
            at_least,
            at_most,
        } => {
            let mut tree = ActionTree::new();
            let mut products = Vec::new();
            if let Some(n) = at_least {
                products.push(value_product(action::Comparator::Ge, n));
            }
            if let Some(n) = at_most {
                products.push(value_product(action::Comparator::Le, n));
            }
            let selector = if products.is_empty() {
                action::Selector::always()
            } else {
                action::Selector { products }
            };
            let node = ActionTemplate::new(ActionKind::Filter)
                .with_input(InputRef::Database(input))
                .with_selector(selector);
            let root = tree.push(node);
            write_database(&tree, root, &config, &output)?;
        }
        Command::Histogram { input } => {
            let mut tree = ActionTree::new();
            let node =
                ActionTemplate::new(ActionKind::Histogram).with_input(InputRef::Database(input));
            let root = tree.push(node);
            let driver = Driver::new(&tree, &config);
            let hist = driver.run_to_histogram(root)?;
            print!("{}", hist.render());
        }
        Command::Statistics { input } => {
            let mut tree = ActionTree::new();
            let node =
                ActionTemplate::new(ActionKind::Statistics).with_input(InputRef::Database(input));
            let root = tree.push(node);
            let driver = Driver::new(&tree, &config);
            let hist = driver.run_to_histogram(root)?;
            let stats = hist.statistics();
            println!("{}", stats.to_json()?);
        }
        Command::Print { input, output } => {
            let mut tree = ActionTree::new();
            let node = ActionTemplate::new(ActionKind::Filter).with_input(InputRef::Database(input));
            let root = tree.push(node);
            let driver = Driver::new(&tree, &config);
            let printer = match output {
                Some(path) => Printer::for_path(&path)?,
                None => Printer::stdout(),
            };
            driver.run_to_printer(root, &printer)?;
        }
        Command::Lookup { database, kmer } => {
            let db = Database::open(&database)?;
            let packed = crate::kmer::string_to_packed(config.schema.k(), kmer.as_bytes())
                .with_context(|| format!("{kmer:?} is not a valid {}-mer", config.schema.k()))?;
            let canonical = crate::kmer::Kmer::from_packed(config.schema.k(), packed).canonical();
            match db.contains(canonical, config.schema.mer_bits())? {
                Some((value, label)) => println!("{kmer}\t{value}\t{label:#x}"),
                None => {
                    println!("{kmer}\tabsent");
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

fn database_inputs(paths: &[PathBuf]) -> Vec<InputRef> {
    paths.iter().cloned().map(InputRef::Database).collect()
}

fn value_product(op: action::Comparator, rhs: u32) -> action::Product {
    action::Product {
        atoms: vec![action::Atom::Value {
            lhs: action::Side::Output,
            op,
            rhs: action::Side::Const(rhs as u64),
            negate: false,
        }],
    }
}

fn write_database(tree: &ActionTree, root: usize, config: &RunConfig, output: &PathBuf) -> Result<()> {
    if output.exists() {
        bail!("output path already exists: {}", output.display());
    }
    let mode = config.resolve_mode();
    let block_prefix_width = choose_block_prefix_width(mode, config.schema.suffix_bits());
    let driver = Driver::new(tree, config);
    driver
        .run_to_database(root, output, block_prefix_width)
        .with_context(|| format!("writing database to {}", output.display()))?;
    Ok(())
}
