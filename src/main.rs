use clap::{Arg, Command};
use std::str::FromStr;

use rescuesim::logging::{LogConfig, LogOutput, init_logging, parse_log_level};
use rescuesim::scenario::ScenarioConfig;
use rescuesim::simulation::{SimulationEngine, SimulationReport};

fn main() {
    // コマンドライン引数の解析
    let matches = Command::new("rescuesim")
        .version("0.1.0")
        .about("救助シミュレーション (Rescue Simulation)")
        .long_about("救助ヘリコプターのホイスト救助とミッション進行を再現する\n\
                     時間駆動型シミュレーションです。")
        .arg(
            Arg::new("scenario")
                .short('s')
                .long("scenario")
                .value_name("FILE")
                .help("シナリオファイル(.yaml)のパスを指定")
                .long_help("実行するシナリオファイル(.yaml)のパスを指定します。\n\
                           指定しない場合、使用方法を表示します。")
        )
        .arg(
            Arg::new("info")
                .short('i')
                .long("info")
                .action(clap::ArgAction::SetTrue)
                .help("シナリオの情報のみ表示して終了")
                .conflicts_with("test")
        )
        .arg(
            Arg::new("test")
                .short('t')
                .long("test")
                .action(clap::ArgAction::SetTrue)
                .help("組み込みのデモシナリオを実行")
                .conflicts_with("info")
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(clap::ArgAction::Count)
                .help("詳細出力レベル (-v: 基本, -vv: 詳細, -vvv: デバッグ)")
        )
        .arg(
            Arg::new("log-output")
                .long("log-output")
                .value_name("OUTPUT")
                .default_value("console")
                .help("ログ出力先 (console, file, both)")
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .default_value("info")
                .help("ログレベル (trace, debug, info, warn, error)")
        )
        .arg(
            Arg::new("log-dir")
                .long("log-dir")
                .value_name("DIR")
                .default_value("logs")
                .help("ログファイルの出力ディレクトリ")
        )
        .get_matches();

    let verbose_level = matches.get_count("verbose");

    let log_output = matches
        .get_one::<String>("log-output")
        .map(|s| LogOutput::from_str(s))
        .transpose()
        .unwrap_or_else(|e| {
            eprintln!("エラー: {}", e);
            std::process::exit(1);
        })
        .unwrap_or(LogOutput::Console);
    let log_level = matches
        .get_one::<String>("log-level")
        .map(|s| parse_log_level(s))
        .unwrap_or(tracing::Level::INFO);
    let log_dir = matches
        .get_one::<String>("log-dir")
        .cloned()
        .unwrap_or_else(|| "logs".to_string());

    let log_config = LogConfig::default()
        .with_level(log_level)
        .with_output(log_output)
        .with_log_dir(log_dir);
    let _log_guard = match init_logging(log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("エラー: ログ初期化に失敗しました: {}", e);
            std::process::exit(1);
        }
    };

    println!("救助シミュレーション (Rescue Simulation) - rescuesim v0.1.0");
    println!();

    if verbose_level > 0 {
        println!("詳細出力レベル: {}", verbose_level);
    }

    let result: Result<(), Box<dyn std::error::Error>> = if matches.get_flag("test") {
        println!("=== デモシナリオ実行モード ===");
        ScenarioConfig::demo()
            .map_err(Into::into)
            .and_then(|scenario| execute_scenario(scenario, verbose_level))
    } else if let Some(scenario_path) = matches.get_one::<String>("scenario") {
        run_scenario(scenario_path, matches.get_flag("info"), verbose_level)
    } else {
        show_default_help();
        Ok(())
    };

    if let Err(e) = result {
        eprintln!("エラー: {}", e);
        std::process::exit(1);
    }
}

/// シナリオファイルを読み込んで実行
fn run_scenario(scenario_path: &str, info_only: bool, verbose_level: u8) -> Result<(), Box<dyn std::error::Error>> {
    let scenario = ScenarioConfig::from_file(scenario_path)?;

    if verbose_level > 0 {
        println!("シナリオファイル読み込み完了: {}", scenario_path);
    }

    if info_only {
        scenario.print_summary();
        return Ok(());
    }

    execute_scenario(scenario, verbose_level)
}

/// シナリオの実行
fn execute_scenario(scenario: ScenarioConfig, verbose_level: u8) -> Result<(), Box<dyn std::error::Error>> {
    scenario.print_summary();
    println!();

    if verbose_level > 0 {
        println!("シミュレーション設定:");
        println!("  時間刻み: {:.3}秒", scenario.sim.dt_s);
        println!("  最大時間: {:.1}秒", scenario.sim.t_max_s);
        println!();
    }

    let mut simulation = SimulationEngine::from_scenario(&scenario, verbose_level)?;
    let report = simulation.run()?;

    print_report(&simulation, &report, verbose_level);
    Ok(())
}

/// 実行結果の表示
fn print_report(simulation: &SimulationEngine, report: &SimulationReport, verbose_level: u8) {
    println!("=== 実行結果 ===");
    println!("経過時間: {:.1}秒 ({}ステップ)", report.elapsed_s, report.steps);
    match report.status {
        Some(status) => println!("ミッション: {:?}", status),
        None => println!("ミッション: なし"),
    }
    println!("得点: {}", report.score);
    println!("救助人数: {}", report.rescues);
    println!("墜落回数: {}", report.crashes);

    if let Some(mission) = &simulation.ctx.mission {
        for line in mission.status_lines(&simulation.ctx) {
            println!("  {}", line);
        }
    }

    if verbose_level > 0 {
        println!();
        println!("=== ミッションログ ===");
        for event in &simulation.ctx.messages.events {
            println!(
                "[{:7.1}s] {:>3} ({:.0}, {:.0}, {:.0}) {}",
                event.elapsed_s,
                event.kind.code(),
                event.position.x,
                event.position.y,
                event.position.z,
                event.text
            );
        }
    }
}

/// デフォルトヘルプを表示
fn show_default_help() {
    println!("使用方法:");
    println!("  rescuesim [オプション]");
    println!();
    println!("オプション:");
    println!("  -s, --scenario <FILE>     シナリオファイルを指定して実行");
    println!("  -i, --info                シナリオ情報のみ表示");
    println!("  -t, --test                組み込みのデモシナリオを実行");
    println!("  -v, --verbose             詳細出力 (複数指定で詳細レベル上昇)");
    println!("      --log-output <OUTPUT> ログ出力先 (console, file, both)");
    println!("      --log-level <LEVEL>   ログレベル");
    println!("      --log-dir <DIR>       ログファイルの出力ディレクトリ");
    println!("  -h, --help                このヘルプを表示");
    println!();
    println!("例:");
    println!("  rescuesim -t -v");
    println!("  rescuesim -s scenarios/lake_rescue.yaml");
    println!("  rescuesim -s scenarios/lake_rescue.yaml -i");
    println!("  rescuesim -s scenarios/lake_rescue.yaml --log-output both --log-level debug");
}
