use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context, Result};
use clap::Parser as ClapParser;
use serde::{Deserialize, Serialize};

use cmb_core::{
    decompile_scene, render_module, DecodeOptions, DecompiledScene, Dialect, Module, Scene, StackDelta,
};
use cmb_nls::Encoding;

#[derive(Debug, Serialize, Deserialize)]
pub struct InstListing {
    location: u32,
    mnemonic: String,
    operand: Option<i32>,
    /// Net stack effect, absent when it depends on the operand or on control flow.
    stack_delta: Option<i8>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SceneListing {
    index: u32,
    kind: u8,
    name: String,
    arg_count: u32,
    local_count: usize,
    parameters: Vec<i32>,
    is_global: bool,
    script_offset: u32,
    instructions: Vec<InstListing>,
}

impl SceneListing {
    pub fn from_scene(scene: &Scene) -> Self {
        Self {
            index: scene.index,
            kind: scene.kind.into(),
            name: scene.name.clone(),
            arg_count: scene.arg_count,
            local_count: scene.local_count(),
            parameters: scene.parameters.clone(),
            is_global: scene.is_global,
            script_offset: scene.script_offset,
            instructions: scene
                .raw_instructions
                .iter()
                .map(|inst| InstListing {
                    location: inst.location,
                    mnemonic: inst.opcode.to_string(),
                    operand: (inst.opcode.operand_width() > 0).then_some(inst.operand),
                    stack_delta: match inst.opcode.info().stack_delta {
                        StackDelta::Fixed(delta) => Some(delta),
                        StackDelta::Variable => None,
                    },
                })
                .collect(),
        }
    }
}

fn write_listing(path: &Path, module: &Module) -> Result<()> {
    let listing: Vec<_> = module.scenes.iter().map(SceneListing::from_scene).collect();
    let mut writer = fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    serde_yaml::to_writer(&mut writer, &listing)?;
    Ok(())
}

/// Decompile every scene. With `keep_going`, a faulted scene is logged and
/// left out instead of aborting; the number of such scenes is returned.
fn decompile_all(module: &Module, keep_going: bool) -> Result<(Vec<DecompiledScene>, usize)> {
    let mut scenes = Vec::with_capacity(module.scenes.len());
    let mut failed = 0;
    for scene in &module.scenes {
        match decompile_scene(module, scene) {
            Ok(decompiled) => scenes.push(decompiled),
            Err(e) if keep_going => {
                log::error!("skipping scene {} '{}': {}", scene.index, scene.name, e);
                failed += 1;
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to decompile scene '{}'", scene.name))
            }
        }
    }
    Ok((scenes, failed))
}

/// Decompile a CMB event script to pseudo-source
#[derive(ClapParser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Input .cmb file
    input: PathBuf,

    /// Output file, stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(short, long, default_value = "sjis")]
    lang: Encoding,

    /// Opcode set: base or extended
    #[arg(long, default_value = "extended")]
    dialect: Dialect,

    /// Also dump the decoded instructions as YAML
    #[arg(long)]
    listing: Option<PathBuf>,

    /// Skip scenes whose statements cannot be reconstructed instead of
    /// stopping. Container and script decode faults still abort
    #[arg(long)]
    keep_going: bool,
}

fn run(args: &Args) -> Result<()> {
    let data = fs::read(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;

    let options = DecodeOptions {
        dialect: args.dialect,
        encoding: args.lang,
        ..Default::default()
    };
    let module = Module::decode(&data, &options)
        .with_context(|| format!("failed to decode {}", args.input.display()))?;

    if let Some(path) = &args.listing {
        write_listing(path, &module)?;
    }

    let (scenes, failed) = decompile_all(&module, args.keep_going)?;
    let text = render_module(&module.global_names, &scenes).context("failed to render")?;

    match &args.output {
        Some(path) => fs::write(path, text)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => std::io::stdout().write_all(text.as_bytes())?,
    }

    if failed > 0 {
        bail!("{} of {} scenes failed to decompile", failed, module.scenes.len());
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("warn"));

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // usage errors exit with 1; --help and --version with 0
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            process::exit(code);
        }
    };
    run(&args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use cmb_core::{Instruction, Opcode, SceneKind};

    fn scene(index: u32, name: &str, insts: Vec<Instruction>) -> Scene {
        Scene {
            index,
            kind: SceneKind::Kind3,
            name: name.to_string(),
            arg_count: 0,
            parameters: vec![5],
            variable_names: vec!["var_0".to_string()],
            script_offset: 0x40,
            raw_instructions: insts,
            is_global: false,
        }
    }

    fn module() -> Module {
        Module {
            scenes: vec![
                scene(
                    0,
                    "EV_Good",
                    vec![
                        Instruction::new(0, Opcode::Val8, 0),
                        Instruction::new(2, Opcode::Return, 0),
                    ],
                ),
                // add with nothing pushed
                scene(
                    1,
                    "EV_Bad",
                    vec![
                        Instruction::new(0, Opcode::Add, 0),
                        Instruction::new(1, Opcode::RetN, 0),
                    ],
                ),
            ],
            string_pool: vec![0],
            global_names: Vec::new(),
            encoding: Encoding::ShiftJis,
        }
    }

    #[test]
    fn parses_arguments() {
        let args = Args::try_parse_from(["cmbdec", "event.cmb"]).unwrap();
        assert_eq!(args.input, PathBuf::from("event.cmb"));
        assert_eq!(args.dialect, Dialect::Extended);
        assert_eq!(args.lang, Encoding::ShiftJis);
        assert!(!args.keep_going);

        let args = Args::try_parse_from([
            "cmbdec",
            "--dialect",
            "base",
            "--lang",
            "utf8",
            "-o",
            "out.txt",
            "--keep-going",
            "event.cmb",
        ])
        .unwrap();
        assert_eq!(args.dialect, Dialect::Base);
        assert_eq!(args.lang, Encoding::Utf8);
        assert_eq!(args.output, Some(PathBuf::from("out.txt")));
        assert!(args.keep_going);
    }

    #[test]
    fn missing_input_is_a_usage_error() {
        let err = Args::try_parse_from(["cmbdec"]).unwrap_err();
        assert!(err.use_stderr());
        assert!(Args::try_parse_from(["cmbdec", "--dialect", "v3", "a.cmb"]).is_err());
    }

    #[test]
    fn keep_going_isolates_faulted_scenes() {
        let module = module();

        let (scenes, failed) = decompile_all(&module, true).unwrap();
        assert_eq!(failed, 1);
        assert_eq!(scenes.len(), 1);
        assert_eq!(scenes[0].name, "EV_Good");

        let err = decompile_all(&module, false).unwrap_err();
        assert!(format!("{:#}", err).contains("EV_Bad"));
    }

    #[test]
    fn listing_serializes_instructions() {
        let module = module();
        let listing = SceneListing::from_scene(&module.scenes[0]);
        assert_eq!(listing.kind, 3);
        assert_eq!(listing.instructions.len(), 2);
        assert_eq!(listing.instructions[0].mnemonic, "val");
        assert_eq!(listing.instructions[0].operand, Some(0));
        assert_eq!(listing.instructions[1].operand, None);
        assert_eq!(listing.instructions[0].stack_delta, Some(1));
        assert_eq!(listing.instructions[1].stack_delta, Some(0));

        let yaml = serde_yaml::to_string(&listing).unwrap();
        assert!(yaml.contains("name: EV_Good"));
        assert!(yaml.contains("mnemonic: ret"));
        assert!(yaml.contains("stack_delta: 1"));
    }

    #[test]
    fn variable_stack_effects_are_left_out_of_the_listing() {
        let call = scene(0, "EV_Call", vec![Instruction::new(0, Opcode::Call, 0)]);
        let listing = SceneListing::from_scene(&call);
        assert_eq!(listing.instructions[0].stack_delta, None);
    }

    #[test]
    fn keep_going_help_names_what_it_isolates() {
        let command = Args::command();
        let arg = command
            .get_arguments()
            .find(|arg| arg.get_id() == "keep_going")
            .unwrap();
        let help = arg.get_help().unwrap().to_string();
        assert!(help.contains("cannot be reconstructed"));
        assert!(help.contains("decode faults still abort"));
    }
}
