use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use epiplot_core::feeds::UreqTransport;
use epiplot_core::vector_field::{FieldPreset, VectorFieldRequest};
use epiplot_core::{Dashboard, DashboardConfig, ModelFamily, SimulationForm};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "epiplot")]
#[command(about = "epiplot - epidemic and growth model dashboard from the terminal", long_about = None)]
struct Cli {
    /// JSON config file (integrator tolerances, feed URLs, cache size)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print compact JSON instead of pretty JSON
    #[arg(long, global = true)]
    compact: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the built-in models and their parameters
    Models,
    /// Integrate a model and print the chart
    Simulate {
        /// Model family key (logistic, exponential, sir, seir, sir_mass_action, rumor, ...)
        family: String,
        /// Parameter override, e.g. `--set beta=0.3` (repeatable)
        #[arg(long = "set", value_name = "NAME=VALUE")]
        overrides: Vec<String>,
        /// End of the time span
        #[arg(long)]
        t_end: Option<f64>,
        /// Number of output samples
        #[arg(long)]
        resolution: Option<usize>,
        /// Print the raw trajectories instead of the chart
        #[arg(long)]
        raw: bool,
    },
    /// Evaluate a direction field
    Field {
        /// Built-in example system (circular, saddle, logistic, sincos, lotka)
        #[arg(long, conflicts_with_all = ["dx", "dy"])]
        preset: Option<String>,
        /// dx/dt as an expression in x and y
        #[arg(long)]
        dx: Option<String>,
        /// dy/dt as an expression in x and y
        #[arg(long)]
        dy: Option<String>,
        /// Half-width of the x range
        #[arg(long, default_value_t = 3.0)]
        range_x: f64,
        /// Half-width of the y range
        #[arg(long, default_value_t = 3.0)]
        range_y: f64,
        /// Grid points per axis
        #[arg(long, default_value_t = 20, allow_negative_numbers = true)]
        mesh: i64,
    },
    /// Fetch a country's COVID-19 history
    Covid {
        /// Country name; omit to list the available countries
        country: Option<String>,
        /// Keep only the most recent days
        #[arg(long)]
        last_days: Option<usize>,
    },
    /// Fetch the hourly temperature forecast for a country
    Weather {
        /// Country name; omit to list the available countries
        country: Option<String>,
    },
    /// Print the precomputed teaching figures
    Defaults {
        /// Print a single chart by key (e.g. `rumor_k1`, `project`)
        #[arg(long)]
        chart: Option<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let dashboard = Dashboard::new(config, Arc::new(UreqTransport::default()))
        .context("dashboard startup failed")?;
    let out = Output {
        compact: cli.compact,
    };

    match cli.command {
        Commands::Models => cmd_models(&dashboard, &out),
        Commands::Simulate {
            family,
            overrides,
            t_end,
            resolution,
            raw,
        } => cmd_simulate(&dashboard, &out, &family, &overrides, t_end, resolution, raw),
        Commands::Field {
            preset,
            dx,
            dy,
            range_x,
            range_y,
            mesh,
        } => {
            let request = field_request(preset.as_deref(), dx, dy, range_x, range_y, mesh)?;
            cmd_field(&dashboard, &out, &request)
        }
        Commands::Covid { country, last_days } => {
            cmd_covid(&dashboard, &out, country.as_deref(), last_days)
        }
        Commands::Weather { country } => cmd_weather(&dashboard, &out, country.as_deref()),
        Commands::Defaults { chart } => cmd_defaults(&dashboard, &out, chart.as_deref()),
    }
}

struct Output {
    compact: bool,
}

impl Output {
    fn print<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        let json = if self.compact {
            serde_json::to_string(value)?
        } else {
            serde_json::to_string_pretty(value)?
        };
        println!("{json}");
        Ok(())
    }
}

fn load_config(path: Option<&Path>) -> Result<DashboardConfig> {
    let Some(path) = path else {
        return Ok(DashboardConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read config {}", path.display()))?;
    let config = DashboardConfig::from_json_str(&text)
        .with_context(|| format!("invalid config {}", path.display()))?;
    debug!(path = %path.display(), "loaded config");
    Ok(config)
}

/// Parses `name=value` into a pair.
fn parse_override(raw: &str) -> Result<(String, f64)> {
    let Some((name, value)) = raw.split_once('=') else {
        bail!("expected NAME=VALUE, got '{raw}'");
    };
    let value: f64 = value
        .trim()
        .parse()
        .with_context(|| format!("'{}' is not a number", value.trim()))?;
    Ok((name.trim().to_string(), value))
}

fn cmd_models(dashboard: &Dashboard, out: &Output) -> Result<()> {
    let catalog = dashboard.catalog();
    let models: Vec<serde_json::Value> = catalog
        .families()
        .map(|family| {
            let model = catalog.get(family);
            serde_json::json!({
                "key": family.key(),
                "title": model.title,
                "state_vars": model.state_vars,
                "parameters": model.parameters,
                "initial_fields": model.initial_fields,
                "default_t_end": model.default_t_end,
                "default_resolution": model.default_resolution,
            })
        })
        .collect();
    out.print(&models)
}

fn cmd_simulate(
    dashboard: &Dashboard,
    out: &Output,
    family: &str,
    overrides: &[String],
    t_end: Option<f64>,
    resolution: Option<usize>,
    raw: bool,
) -> Result<()> {
    let family: ModelFamily = family.parse()?;
    let mut form = SimulationForm::defaults_for(family);
    for raw_override in overrides {
        let (name, value) = parse_override(raw_override)?;
        form.values.insert(name, value);
    }
    form.t_end = t_end;
    form.resolution = resolution;

    if raw {
        let (result, _) = dashboard.run_simulation(family, &form)?;
        return out.print(&result);
    }
    let outcome = dashboard.simulate(family, &form);
    if let Some(message) = &outcome.message {
        eprintln!("{message}");
    }
    out.print(&outcome)
}

fn field_request(
    preset: Option<&str>,
    dx: Option<String>,
    dy: Option<String>,
    range_x: f64,
    range_y: f64,
    mesh: i64,
) -> Result<VectorFieldRequest> {
    if let Some(preset) = preset {
        let preset: FieldPreset = preset.parse().map_err(anyhow::Error::msg)?;
        return Ok(preset.request(range_x, range_y, mesh));
    }
    match (dx, dy) {
        (Some(dx_expr), Some(dy_expr)) => Ok(VectorFieldRequest {
            dx_expr,
            dy_expr,
            range_x,
            range_y,
            mesh_density: mesh,
        }),
        (None, None) => Ok(FieldPreset::Circular.request(range_x, range_y, mesh)),
        _ => bail!("--dx and --dy must be given together"),
    }
}

fn cmd_field(dashboard: &Dashboard, out: &Output, request: &VectorFieldRequest) -> Result<()> {
    let outcome = dashboard.vector_field(request, None);
    if let Some(message) = &outcome.message {
        eprintln!("{message}");
    }
    out.print(&outcome)
}

fn cmd_covid(
    dashboard: &Dashboard,
    out: &Output,
    country: Option<&str>,
    last_days: Option<usize>,
) -> Result<()> {
    let Some(country) = country else {
        return out.print(&dashboard.covid_countries());
    };
    let panel = dashboard.covid(Some(country), last_days);
    if let Some(message) = &panel.panel.message {
        eprintln!("{message}");
    }
    out.print(&panel)
}

fn cmd_weather(dashboard: &Dashboard, out: &Output, country: Option<&str>) -> Result<()> {
    let Some(country) = country else {
        return out.print(&dashboard.weather_countries());
    };
    let outcome = dashboard.weather(country);
    if let Some(message) = &outcome.message {
        eprintln!("{message}");
    }
    out.print(&outcome)
}

fn cmd_defaults(dashboard: &Dashboard, out: &Output, chart: Option<&str>) -> Result<()> {
    let figures = dashboard.default_figures();
    let Some(key) = chart else {
        eprintln!(
            "I(6) for the project scenario: {:.2}",
            figures.project_infected_on_report_day
        );
        return out.print(figures);
    };
    match figures.get(key) {
        Some(chart) => out.print(chart),
        None => {
            let keys: Vec<String> = figures.charts().into_iter().map(|(k, _)| k).collect();
            bail!("unknown chart '{key}'; available: {}", keys.join(", "))
        }
    }
}
