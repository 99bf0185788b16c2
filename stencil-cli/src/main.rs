//! Command-line interface for stencil
//! This binary compiles stencil templates to their listing form, or renders them with
//! variables read from a JSON or YAML file.
//!
//! Usage:
//!   stencil compile `<path>`                      - Print the compiled listing
//!   stencil render `<path>` [--vars `<file>`]     - Render the template
//!
//! Global options: --config `<file>`, --open `<token>`, --close `<token>`, --root `<dir>`
//!
//! With a template root (`--root` or `templates.root`), `render` takes a template name
//! relative to that root, and includes resolve from the root too.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Arg, ArgMatches, Command};
use log::debug;
use stencil::template::manager::{FileSource, TemplateManager};
use stencil::{compile, Bindings, CompileOptions};
use stencil_config::{Loader, StencilConfig};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let matches = Command::new("stencil")
        .version(env!("CARGO_PKG_VERSION"))
        .about("A compiler for stencil templates")
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .help("Configuration file layered over the built-in defaults"),
        )
        .arg(
            Arg::new("open")
                .long("open")
                .global(true)
                .help("Token that opens a directive (default: '{')"),
        )
        .arg(
            Arg::new("close")
                .long("close")
                .global(true)
                .help("Token that closes a directive (default: '}')"),
        )
        .arg(
            Arg::new("root")
                .long("root")
                .global(true)
                .help("Directory template names are resolved against"),
        )
        .subcommand(
            Command::new("compile")
                .about("Print the compiled listing of a template")
                .arg(
                    Arg::new("path")
                        .help("Path to the template file")
                        .required(true)
                        .index(1),
                ),
        )
        .subcommand(
            Command::new("render")
                .about("Render a template")
                .arg(
                    Arg::new("path")
                        .help("Path to the template file")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::new("vars")
                        .long("vars")
                        .short('v')
                        .help("Variables file (.json, .yaml or .yml)"),
                ),
        )
        .get_matches();

    let config = load_config(&matches).unwrap_or_else(|e| {
        eprintln!("Configuration error: {}", e);
        process::exit(1);
    });
    let options = config.compile_options();

    match matches.subcommand() {
        Some(("compile", sub)) => {
            let path = sub
                .get_one::<String>("path")
                .expect("path is a required argument");
            handle_compile_command(path, &options);
        }
        Some(("render", sub)) => {
            let path = sub
                .get_one::<String>("path")
                .expect("path is a required argument");
            let vars = sub.get_one::<String>("vars");
            let root = config.templates.root.as_deref();
            handle_render_command(path, vars.map(String::as_str), root, options);
        }
        _ => {
            eprintln!("Unknown command. Run `stencil --help` for usage.");
            process::exit(1);
        }
    }
}

/// Defaults, then the config file, then command-line flags.
fn load_config(matches: &ArgMatches) -> Result<StencilConfig, String> {
    let mut loader = match matches.get_one::<String>("config") {
        Some(path) => Loader::new().with_file(path),
        None => Loader::new().with_optional_file("stencil.toml"),
    };
    let flags = [
        ("open", "syntax.operator_open"),
        ("close", "syntax.operator_close"),
        ("root", "templates.root"),
    ];
    for (flag, key) in flags {
        if let Some(value) = matches.get_one::<String>(flag) {
            loader = loader
                .set_override(key, value.as_str())
                .map_err(|e| e.to_string())?;
        }
    }
    loader.build().map_err(|e| e.to_string())
}

/// The directory to load templates from and the name to render.
///
/// With a root, `path` is already a name under it. Otherwise the template's own
/// directory is the root, so its includes resolve next to it.
fn resolve_template(path: &str, root: Option<&Path>) -> Result<(PathBuf, String), String> {
    if let Some(root) = root {
        return Ok((root.to_path_buf(), path.to_string()));
    }
    let template = Path::new(path);
    let dir = template
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = template
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| format!("Invalid template path: {}", path))?;
    Ok((dir.to_path_buf(), name.to_string()))
}

/// Handle the compile command
fn handle_compile_command(path: &str, options: &CompileOptions) {
    let source = fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("Error reading {}: {}", path, e);
        process::exit(1);
    });
    match compile(&source, options) {
        Ok(template) => println!("{}", template.listing()),
        Err(e) => {
            eprintln!("{}: {}", path, e);
            process::exit(1);
        }
    }
}

/// Handle the render command
fn handle_render_command(
    path: &str,
    vars: Option<&str>,
    root: Option<&Path>,
    options: CompileOptions,
) {
    let bindings = match vars {
        Some(vars) => load_bindings(vars).unwrap_or_else(|e| {
            eprintln!("Error reading variables from {}: {}", vars, e);
            process::exit(1);
        }),
        None => Bindings::new(),
    };

    let (root, name) = resolve_template(path, root).unwrap_or_else(|e| {
        eprintln!("{}", e);
        process::exit(1);
    });
    debug!("rendering `{}` from {}", name, root.display());

    let manager = TemplateManager::new(FileSource::new(root)).with_options(options);
    match manager.render(&name, &bindings) {
        Ok(output) => print!("{}", output),
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    }
}

fn load_bindings(path: &str) -> Result<Bindings, String> {
    let text = fs::read_to_string(path).map_err(|e| e.to_string())?;
    let extension = Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default();
    match extension {
        "json" => Bindings::from_json(&text).map_err(|e| e.to_string()),
        "yaml" | "yml" => serde_yaml::from_str(&text).map_err(|e| e.to_string()),
        other => Err(format!(
            "unsupported variables format '{}' (expected json, yaml or yml)",
            other
        )),
    }
}
