use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::{Context, IntoDiagnostic};

use ubflow_ir::{DataType, Shape, TensorDescriptor};
use ubflow_kernel::LaunchOptions;
use ubflow_ops::{AttrValue, Attrs, HostTensor, Operator, OperatorRegistry, TensorData};
use ubflow_tiling::{HardwareSpec, TilingData, TilingPlan};

/// ubflow: tiling planner and streaming runner for accelerator operators
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Raise the log level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compute the tiling plan for an operator
    Plan {
        #[command(flatten)]
        op: OpArgs,

        /// Write the serialized plan to this path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Plan and run an operator on generated input
    Run {
        #[command(flatten)]
        op: OpArgs,

        /// Print every pipeline stage of every core
        #[arg(long)]
        trace: bool,
    },
    /// Decode a serialized plan
    Decode {
        /// Plan file written by `plan --output`
        blob: PathBuf,
    },
    /// List the operators and the element types they accept
    List {
        /// Target whose capabilities filter the element types
        #[arg(short, long, default_value = HardwareSpec::DEFAULT_TARGET)]
        target: String,
    },
}

/// Operator, inputs and hardware selection shared by `plan` and `run`.
#[derive(Args)]
struct OpArgs {
    /// Operator name (see `ubflow list`)
    #[arg(long)]
    op: String,

    /// Input shape as comma-separated dimensions; repeat once per input
    #[arg(long, value_parser = parse_shape, required = true)]
    shape: Vec<Shape>,

    /// Input element type; repeat per input, the last one carries over
    #[arg(long, default_value = "f32")]
    dtype: Vec<DataType>,

    /// Hardware target
    #[arg(short, long, default_value = HardwareSpec::DEFAULT_TARGET)]
    target: String,

    /// Override the number of cores
    #[arg(long)]
    cores: Option<u64>,

    /// Override the unified buffer size in bytes
    #[arg(long)]
    ub_bytes: Option<u64>,

    /// Operator attribute as key=value; may be repeated
    #[arg(long = "attr", value_parser = parse_attr)]
    attrs: Vec<(String, AttrValue)>,
}

fn parse_shape(s: &str) -> Result<Shape, String> {
    let s = s.trim();
    let dims = if s.is_empty() {
        Vec::new()
    } else {
        s.split(',')
            .map(|d| {
                d.trim()
                    .parse::<u64>()
                    .map_err(|_| format!("invalid dimension '{d}' in shape '{s}'"))
            })
            .collect::<Result<Vec<_>, _>>()?
    };
    Shape::new(dims).map_err(|e| e.to_string())
}

fn parse_attr(s: &str) -> Result<(String, AttrValue), String> {
    Attrs::parse_pair(s).map_err(|e| e.to_string())
}

impl OpArgs {
    fn hardware(&self) -> HardwareSpec {
        let mut hw = HardwareSpec::for_target(&self.target);
        if let Some(cores) = self.cores {
            hw = hw.with_core_count(cores);
        }
        if let Some(ub) = self.ub_bytes {
            hw = hw.with_ub_bytes(ub);
        }
        hw
    }

    fn attrs(&self) -> Attrs {
        let mut attrs = Attrs::new();
        for (k, v) in &self.attrs {
            attrs.set(k, v.clone());
        }
        attrs
    }

    /// Descriptors for the given shapes, completed with the operator's
    /// usual companion inputs when only the first is given.
    fn inputs(&self) -> miette::Result<Vec<TensorDescriptor>> {
        let mut descs = Vec::with_capacity(self.shape.len());
        for (i, shape) in self.shape.iter().enumerate() {
            let dtype = self
                .dtype
                .get(i)
                .or(self.dtype.last())
                .copied()
                .unwrap_or(DataType::F32);
            descs.push(TensorDescriptor::new(shape.clone(), dtype).into_diagnostic()?);
        }
        if descs.len() == 1 {
            descs = companions(&self.op, descs.remove(0));
        }
        Ok(descs)
    }
}

/// Fills in the remaining inputs of multi-input operators from the first.
fn companions(op: &str, x: TensorDescriptor) -> Vec<TensorDescriptor> {
    let single = TensorDescriptor::vector(1, x.dtype());
    match op {
        "logical_or" | "mse_loss" => vec![x.clone(), x],
        "heaviside" => vec![x, single],
        "addcdiv" | "addcmul" => vec![x.clone(), x.clone(), x, single],
        "lerp" => vec![x.clone(), x, single],
        "gather" => {
            let rows = x.shape().dims().first().copied().unwrap_or(1);
            vec![x, TensorDescriptor::vector(rows, DataType::I32)]
        }
        _ => vec![x],
    }
}

/// Deterministic input data; gather indices stay within the gathered axis.
fn sample(op: &str, position: usize, inputs: &[TensorDescriptor]) -> miette::Result<HostTensor> {
    let desc = &inputs[position];
    if op == "gather" && position == 1 {
        let axis = inputs[0].shape().dims().first().copied().unwrap_or(1).max(1);
        let n = desc.element_count();
        let data = match desc.dtype() {
            DataType::I64 => TensorData::I64((0..n).map(|i| ((i * 7) % axis) as i64).collect()),
            _ => TensorData::I32((0..n).map(|i| ((i * 7) % axis) as i32).collect()),
        };
        return HostTensor::new(desc.shape().clone(), data).into_diagnostic();
    }
    HostTensor::ramp(desc).into_diagnostic()
}

fn find<'r>(registry: &'r OperatorRegistry, name: &str) -> miette::Result<&'r dyn Operator> {
    registry.find(name).ok_or_else(|| {
        let available = registry.list().join(", ");
        miette::miette!("unknown operator '{name}' (available: {available})")
    })
}

fn print_plan(plan: &TilingPlan) {
    println!("{plan}");
    for a in plan.assignments() {
        println!(
            "  core {:>3}: offset {:>10}, {} elements, {} iterations of {} (tail {})",
            a.core_idx,
            a.offset,
            a.valid_elements(plan.total_elements),
            a.iterations,
            a.tile_elements,
            a.tail_elements
        );
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> miette::Result<()> {
    let registry = OperatorRegistry::with_builtins();
    match command {
        Command::Plan { op, output } => {
            let hw = op.hardware();
            let operator = find(&registry, &op.op)?;
            let inputs = op.inputs()?;
            let plan = operator
                .tiling(&inputs, &op.attrs(), &hw)
                .into_diagnostic()
                .wrap_err_with(|| format!("failed to plan {}", op.op))?;
            println!("{hw}");
            print_plan(&plan);
            if let Some(path) = output {
                std::fs::write(&path, plan.to_bytes())
                    .into_diagnostic()
                    .wrap_err_with(|| format!("failed to write {}", path.display()))?;
                log::info!("wrote {} bytes to {}", TilingData::SIZE, path.display());
            }
        }
        Command::Run { op, trace } => {
            let hw = op.hardware();
            let operator = find(&registry, &op.op)?;
            let descs = op.inputs()?;
            let inputs = (0..descs.len())
                .map(|i| sample(&op.op, i, &descs))
                .collect::<miette::Result<Vec<_>>>()?;
            let options = LaunchOptions { trace };
            let result = ubflow_ops::run_operator(operator, &inputs, &op.attrs(), &hw, &options)
                .into_diagnostic()
                .wrap_err_with(|| format!("failed to run {}", op.op))?;
            for input in &inputs {
                println!("input  {input}");
            }
            print!("{result}");
            if trace {
                for core in &result.report.cores {
                    for event in &core.events {
                        println!("  core {}: {event}", core.core_idx);
                    }
                }
            }
        }
        Command::Decode { blob } => {
            let bytes = std::fs::read(&blob)
                .into_diagnostic()
                .wrap_err_with(|| format!("failed to read {}", blob.display()))?;
            let plan = TilingPlan::from_bytes(&bytes)
                .into_diagnostic()
                .wrap_err_with(|| format!("{} is not a valid plan", blob.display()))?;
            print_plan(&plan);
            println!("  scalars: {:?}", plan.scalars);
        }
        Command::List { target } => {
            let hw = HardwareSpec::for_target(&target);
            for name in registry.list() {
                let op = find(&registry, name)?;
                let dtypes: Vec<&str> = op.supported_dtypes(&hw).iter().map(|d| d.name()).collect();
                println!("{name:<12} {}", dtypes.join(", "));
            }
        }
    }
    Ok(())
}
