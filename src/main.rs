mod logging;
mod models;
mod scenario;
mod simulation;

use clap::{Arg, ArgAction, Command};
use logging::{init_logging, parse_log_level, LogConfig, LogOutput};
use scenario::ScenarioConfig;
use simulation::SimulationEngine;
use tracing::{debug, info};

fn main() {
    let matches = Command::new("hideseek")
        .version("0.1.0")
        .about("ロボットかくれんぼ ゲーム進行コア (Hide-and-Seek)")
        .long_about(
            "隠れる側と探す側のロボットによるかくれんぼゲームの進行コアです。\n\
             シナリオに記述した時計・姿勢・スキャンの入力を再生し、段階遷移と各エージェントの速度指令を確認します。",
        )
        .arg(
            Arg::new("scenario")
                .short('s')
                .long("scenario")
                .value_name("FILE")
                .help("シナリオファイル(.yaml)のパスを指定")
                .conflicts_with("demo"),
        )
        .arg(
            Arg::new("info")
                .short('i')
                .long("info")
                .action(ArgAction::SetTrue)
                .help("シナリオの情報のみ表示して終了"),
        )
        .arg(
            Arg::new("demo")
                .short('d')
                .long("demo")
                .action(ArgAction::SetTrue)
                .help("組み込みの捕獲シナリオを実行"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("詳細出力レベル (-v: 基本, -vv: 詳細, -vvv: デバッグ)"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .default_value("info")
                .help("ログレベル (trace, debug, info, warn, error)"),
        )
        .arg(
            Arg::new("log-output")
                .long("log-output")
                .value_name("TARGET")
                .default_value("console")
                .value_parser(|s: &str| s.parse::<LogOutput>())
                .help("ログ出力先 (console, file, both)"),
        )
        .get_matches();

    let verbose_level = matches.get_count("verbose");

    let log_config = LogConfig {
        level: parse_log_level(matches.get_one::<String>("log-level").map(String::as_str).unwrap_or("info")),
        output: matches.get_one::<LogOutput>("log-output").copied().unwrap_or(LogOutput::Console),
        ..LogConfig::default()
    }
    .with_verbosity(verbose_level);

    let _log_guard = match init_logging(log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("ログ初期化エラー: {}", e);
            std::process::exit(1);
        }
    };

    println!("ロボットかくれんぼ - hideseek v0.1.0");
    println!();

    let scenario = if matches.get_flag("demo") {
        Ok(ScenarioConfig::demo())
    } else if let Some(path) = matches.get_one::<String>("scenario") {
        debug!(path = %path, "シナリオファイルを読み込みます");
        ScenarioConfig::from_file(path)
    } else {
        show_default_help();
        return;
    };

    let result = scenario
        .map_err(|e| Box::new(e) as Box<dyn std::error::Error>)
        .and_then(|scenario| run_scenario(scenario, matches.get_flag("info"), verbose_level));

    if let Err(e) = result {
        eprintln!("エラー: {}", e);
        std::process::exit(1);
    }
}

/// シナリオを実行（`info_only` の場合は概要表示のみ）
fn run_scenario(scenario: ScenarioConfig, info_only: bool, verbose_level: u8) -> Result<(), Box<dyn std::error::Error>> {
    scenario.print_summary();
    println!();

    if info_only {
        return Ok(());
    }

    let mut simulation = SimulationEngine::new(scenario, verbose_level);
    simulation.run()?;
    simulation.print_summary();

    if verbose_level > 0 {
        info!("シナリオ実行が正常に完了しました");
    }
    Ok(())
}

fn show_default_help() {
    println!("使用方法:");
    println!("  hideseek [オプション]");
    println!();
    println!("オプション:");
    println!("  -s, --scenario <FILE>     シナリオファイルを指定して実行");
    println!("  -i, --info                シナリオ情報のみ表示");
    println!("  -d, --demo                組み込みの捕獲シナリオを実行");
    println!("  -v, --verbose             詳細出力 (複数指定で詳細レベル上昇)");
    println!("      --log-level <LEVEL>   ログレベル");
    println!("      --log-output <TARGET> ログ出力先");
    println!("  -h, --help                このヘルプを表示");
    println!();
    println!("利用可能なシナリオファイル:");
    println!("  scenarios/capture.yaml      - 探す側が接近して捕獲");
    println!("  scenarios/timeout.yaml      - 制限時間まで逃げ切り");
    println!("  scenarios/two_seekers.yaml  - 探す側2台の割り当て");
    println!();
    println!("例:");
    println!("  hideseek -s scenarios/capture.yaml");
    println!("  hideseek -s scenarios/two_seekers.yaml -vv --log-output both");
    println!("  hideseek -d");
}
