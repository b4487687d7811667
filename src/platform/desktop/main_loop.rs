use std::{collections::HashMap, time::Duration};

use clap::{value_t, App, AppSettings, Arg, ArgMatches, SubCommand};
use log::{error, info, warn, LevelFilter};

use crate::{
    apply_scene_events, init_engine, regions::RegionSchedule, simulation_parameters::SimulationParams,
    write_statistics, SceneConfig, SimulationEngine, VisualizedAttribute,
};

use super::snapshot::{next_free_path, write_png};

const CARGO_PKG_AUTHORS: &str = env!("CARGO_PKG_AUTHORS");
const CARGO_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");
const CARGO_PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

const LOG_EVERY_FRAMES: usize = 100;

pub fn start() {
    let matches = App::new("Powder Grid")
        .version(CARGO_PKG_VERSION)
        .author(CARGO_PKG_AUTHORS)
        .about(CARGO_PKG_DESCRIPTION)
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("v")
                .short("v")
                .multiple(true)
                .global(true)
                .help("Sets the level of verbosity"),
        )
        .subcommand(
            SubCommand::with_name("run")
                .about("Run simulation headless with given config")
                .arg(
                    Arg::with_name("SIMULATION_CONFIG")
                        .help("Sets the simulation parameters")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::with_name("SCENE_CONFIG")
                        .help("Scene setup")
                        .required(false)
                        .index(2),
                )
                .arg(
                    Arg::with_name("FRAMES")
                        .long("frames")
                        .short("n")
                        .takes_value(true)
                        .default_value("1000")
                        .help("Stop simulation after the given number of frames"),
                )
                .arg(
                    Arg::with_name("OVERWRITE_CONFIG_FILE")
                        .long("overwrite-config-file")
                        .short("c")
                        .required(false)
                        .takes_value(true)
                        .help("Overwrite single values of the simulation config"),
                )
                .arg(
                    Arg::with_name("STATISTICS_ENABLED")
                        .help("Track timings and atom counts of every frame")
                        .short("p")
                        .long("statistics-enabled")
                        .takes_value(false),
                )
                .arg(
                    Arg::with_name("STATISTICS_PATH")
                        .long("statistics-path")
                        .short("w")
                        .required(false)
                        .takes_value(true)
                        .help("Where to write statistics to"),
                )
                .arg(
                    Arg::with_name("THREADS")
                        .long("threads")
                        .short("t")
                        .takes_value(true)
                        .help("Overrides the thread count of the simulation config"),
                )
                .arg(
                    Arg::with_name("GROUPS")
                        .long("groups")
                        .short("g")
                        .takes_value(true)
                        .help("Overrides the group count of the simulation config"),
                )
                .arg(
                    Arg::with_name("SNAPSHOT_PATH")
                        .long("snapshot")
                        .takes_value(true)
                        .help("Write png snapshots of the grid to <PATH>-<i>.png"),
                )
                .arg(
                    Arg::with_name("SNAPSHOT_EVERY")
                        .long("snapshot-every")
                        .takes_value(true)
                        .default_value("100")
                        .help("Frames between two snapshots"),
                )
                .arg(
                    Arg::with_name("ATTRIBUTE")
                        .long("attribute")
                        .takes_value(true)
                        .default_value("atom-type")
                        .help("Coloring of the snapshots (atom-type, speed, generation)"),
                ),
        )
        .subcommand(
            SubCommand::with_name("schedule")
                .about("Print the region schedule for a grid width and worker layout")
                .arg(Arg::with_name("WIDTH").required(true).index(1))
                .arg(Arg::with_name("THREADS").required(true).index(2))
                .arg(Arg::with_name("GROUPS").required(true).index(3)),
        )
        .get_matches();

    let level = match matches.occurrences_of("v") {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new().filter_level(level).parse_default_env().init();

    let result = if let Some(run_matches) = matches.subcommand_matches("run") {
        run_command(run_matches)
    } else if let Some(schedule_matches) = matches.subcommand_matches("schedule") {
        schedule_command(schedule_matches)
    } else {
        unreachable!()
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

/// Replaces top-level keys of `simulation_params_serde` by the values in `overwrite_config`.
/// Unknown keys are rejected so typos do not go unnoticed.
fn apply_overwrites(simulation_params_serde: &mut serde_yaml::Value, overwrite_config: &str) -> Result<(), String> {
    let overwrites: HashMap<String, serde_yaml::Value> =
        serde_yaml::from_str(overwrite_config).map_err(|e| format!("failed parsing overwrite config: {}", e))?;
    let defaults = serde_yaml::to_value(SimulationParams::default()).map_err(|e| e.to_string())?;

    let mapping = simulation_params_serde
        .as_mapping_mut()
        .ok_or("simulation config is not a mapping")?;
    for (k, v) in overwrites.into_iter() {
        let key = serde_yaml::Value::String(k.clone());
        if defaults.get(&k).is_none() {
            return Err(format!("not able to find attribute {}", k));
        }
        mapping.insert(key, v);
    }
    Ok(())
}

fn load_simulation_params(params_yaml: &str, overwrite_config: Option<&str>) -> Result<SimulationParams, String> {
    let mut simulation_params_serde = if params_yaml.trim().is_empty() {
        serde_yaml::Value::Mapping(Default::default())
    } else {
        serde_yaml::from_str(params_yaml).map_err(|e| format!("failed parsing simulation config: {}", e))?
    };

    if let Some(overwrite_config) = overwrite_config {
        apply_overwrites(&mut simulation_params_serde, overwrite_config)?;
    }

    serde_yaml::from_value(simulation_params_serde).map_err(|e| format!("failed to unpack SimulationParams: {}", e))
}

fn read_file(path: &str) -> Result<String, String> {
    std::fs::read_to_string(path).map_err(|e| format!("failed reading {}: {}", path, e))
}

fn run_command(run_matches: &ArgMatches) -> Result<(), String> {
    let parameter_file = run_matches
        .value_of("SIMULATION_CONFIG")
        .ok_or("missing simulation config")?;
    let overwrite_config = match run_matches.value_of("OVERWRITE_CONFIG_FILE") {
        Some(path) => Some(read_file(path)?),
        None => None,
    };
    let mut simulation_params = load_simulation_params(&read_file(parameter_file)?, overwrite_config.as_deref())?;

    let scene_config: SceneConfig = match run_matches.value_of("SCENE_CONFIG") {
        Some(path) => serde_yaml::from_str(&read_file(path)?).map_err(|e| format!("failed parsing scene config: {}", e))?,
        None => SceneConfig::default(),
    };
    info!("{:?}", scene_config);

    if run_matches.is_present("THREADS") {
        simulation_params.thread_count = value_t!(run_matches, "THREADS", usize).map_err(|e| e.to_string())?;
    }
    if run_matches.is_present("GROUPS") {
        simulation_params.group_count = value_t!(run_matches, "GROUPS", usize).map_err(|e| e.to_string())?;
    }

    let max_frames = value_t!(run_matches, "FRAMES", usize).map_err(|e| e.to_string())?;
    let snapshot_every = value_t!(run_matches, "SNAPSHOT_EVERY", usize).map_err(|e| e.to_string())?;
    let attribute: VisualizedAttribute = run_matches.value_of("ATTRIBUTE").unwrap_or("atom-type").parse()?;
    let snapshots = run_matches
        .value_of("SNAPSHOT_PATH")
        .map(|basepath| (snapshot_every.max(1), basepath, attribute));

    info!("{:?}", simulation_params);

    let counters_enabled = run_matches.is_present("STATISTICS_ENABLED");
    let statistics_path_opt = run_matches.value_of("STATISTICS_PATH");

    let engine = simulation_main(
        simulation_params,
        &scene_config,
        max_frames,
        snapshots,
        counters_enabled,
    )?;

    if counters_enabled {
        let s = write_statistics(&engine);
        print!("{}", s);
        if let Some(statistics_path) = statistics_path_opt {
            std::fs::write(statistics_path, s).map_err(|e| format!("failed writing statistics: {}", e))?;
        }
    }

    Ok(())
}

fn simulation_main(
    simulation_params: SimulationParams,
    scene_config: &SceneConfig,
    max_frames: usize,
    snapshots: Option<(usize, &str, VisualizedAttribute)>,
    counters_enabled: bool,
) -> Result<SimulationEngine, String> {
    let mut engine = init_engine(simulation_params, scene_config, counters_enabled).map_err(|e| e.to_string())?;

    let mut total_duration = Duration::from_nanos(0);

    while engine.frame_number() < max_frames {
        let statistics = engine.step().map_err(|e| e.to_string())?;
        total_duration += statistics.duration;

        if let Err(e) = apply_scene_events(&mut engine, scene_config) {
            // a rejected layout keeps the previous pool running
            warn!("frame {}: {}", engine.frame_number(), e);
        }

        if statistics.frame % LOG_EVERY_FRAMES == 0 {
            info!(
                "{:05}: {} atoms, {} moved, {} vanished, {:.3}msec ({:.3}msec AVG)",
                statistics.frame,
                statistics.live_atoms,
                statistics.moved,
                statistics.vanished,
                statistics.duration.as_secs_f32() * 1000.,
                (total_duration / statistics.frame as u32).as_secs_f32() * 1000.
            );
        }

        if let Some((every, basepath, attribute)) = snapshots {
            if statistics.frame % every == 0 {
                let path = next_free_path(basepath);
                write_png(&path, engine.grid(), attribute)?;
                info!("wrote snapshot {}", path.display());
            }
        }
    }

    Ok(engine)
}

fn schedule_command(schedule_matches: &ArgMatches) -> Result<(), String> {
    let width = value_t!(schedule_matches, "WIDTH", usize).map_err(|e| e.to_string())?;
    let thread_count = value_t!(schedule_matches, "THREADS", usize).map_err(|e| e.to_string())?;
    let group_count = value_t!(schedule_matches, "GROUPS", usize).map_err(|e| e.to_string())?;

    let schedule = RegionSchedule::build(width, 1, thread_count, group_count).map_err(|e| e.to_string())?;
    println!(
        "{} threads, {} groups, {} regions, stripe width {}",
        schedule.thread_count(),
        schedule.effective_group_count(),
        schedule.region_count(),
        schedule.stripe_width()
    );
    for (group_idx, group) in schedule.groups().iter().enumerate() {
        let columns: Vec<String> = group
            .iter()
            .map(|region| format!("{}..{}", region.x, region.x + region.w))
            .collect();
        println!("group {}: {}", group_idx, columns.join(" "));
    }

    Ok(())
}
