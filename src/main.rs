use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use node_forge_codegen::migrate::{self, report, tree};
use node_forge_codegen::session::{BuildConfig, BuildSession};
use node_forge_codegen::{dsl, n64, schema};

const USAGE: &str = "usage: node-forge-codegen [--material-json <material.json>]... [--config <build.json>] \
[--trait-ir-json <traits.json>] [--logic-json <logic.json>] [--outputdir <dir>] [--validate]";

#[derive(Debug, Default, Clone)]
struct Cli {
    material_json: Vec<PathBuf>,
    config: Option<PathBuf>,
    trait_ir_json: Option<PathBuf>,
    logic_json: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    validate: bool,
}

impl Cli {
    fn has_inputs(&self) -> bool {
        !self.material_json.is_empty() || self.trait_ir_json.is_some() || self.logic_json.is_some()
    }
}

fn parse_cli(args: &[String]) -> Result<Cli> {
    let mut cli = Cli::default();
    let mut i = 0;
    while i < args.len() {
        let flag = args[i].as_str();
        if flag == "--validate" {
            cli.validate = true;
            i += 1;
            continue;
        }
        let value = |name: &str| {
            args.get(i + 1)
                .map(PathBuf::from)
                .ok_or_else(|| anyhow!("missing value for {name}"))
        };
        match flag {
            "--material-json" => cli.material_json.push(value(flag)?),
            "--config" => cli.config = Some(value(flag)?),
            "--trait-ir-json" => cli.trait_ir_json = Some(value(flag)?),
            "--logic-json" => cli.logic_json = Some(value(flag)?),
            "--outputdir" | "--output-dir" => cli.output_dir = Some(value("--outputdir")?),
            other => bail!("unknown argument: {other}\n{USAGE}"),
        }
        i += 2;
    }
    Ok(cli)
}

fn build_materials(cli: &Cli, output_dir: &Path) -> Result<()> {
    let mut config = match cli.config.as_deref() {
        Some(path) => BuildConfig::load(path)?,
        None => BuildConfig::default(),
    };
    if cli.output_dir.is_some() || cli.config.is_none() {
        config.output_dir = output_dir.to_path_buf();
    }
    config.validate_glsl |= cli.validate;

    let mut session = BuildSession::new(config);
    for path in &cli.material_json {
        let doc = dsl::load_material_from_path(path)?;
        session.build_material(&doc)?;
    }
    let summary = session.finish()?;
    println!(
        "[build] {} shader passes, world defs: {}",
        summary.shader_passes.len(),
        summary.world_defs.join(" ")
    );
    Ok(())
}

fn emit_traits(path: &Path, output_dir: &Path) -> Result<()> {
    let doc = n64::ir::load_trait_ir_from_path(path)?;
    let files = n64::write_outputs(&doc, output_dir)?;
    println!("[n64] wrote {} files to {}", files.len(), output_dir.display());
    Ok(())
}

fn migrate_logic(path: &Path, output_dir: &Path) -> Result<()> {
    let registry = schema::load_default_registry()?;
    let mut doc = tree::load_logic_doc_from_path(path)?;
    let outcome = migrate::migrate_doc(&mut doc, &registry);

    let report_dir = path.parent().unwrap_or(Path::new("."));
    report::write_report(report_dir, &outcome.errors, chrono::Local::now())?;

    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("logic");
    let out_path = output_dir.join(format!("{stem}.migrated.json"));
    std::fs::create_dir_all(output_dir).with_context(|| format!("failed to create {}", output_dir.display()))?;
    let text = serde_json::to_string_pretty(&doc)?;
    std::fs::write(&out_path, text).with_context(|| format!("failed to write {}", out_path.display()))?;
    println!(
        "[migrate] {} node(s) updated, {} failure(s): {}",
        outcome.replaced.len(),
        outcome.errors.len(),
        out_path.display()
    );
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let argv: Vec<String> = std::env::args().skip(1).collect();
    let cli = parse_cli(&argv)?;
    if !cli.has_inputs() {
        eprintln!("{USAGE}");
        bail!("no input documents given");
    }
    let output_dir = cli.output_dir.clone().unwrap_or_else(|| PathBuf::from("."));

    if !cli.material_json.is_empty() {
        build_materials(&cli, &output_dir)?;
    }
    if let Some(path) = cli.trait_ir_json.as_deref() {
        emit_traits(path, &output_dir)?;
    }
    if let Some(path) = cli.logic_json.as_deref() {
        migrate_logic(path, &output_dir)?;
    }
    Ok(())
}
