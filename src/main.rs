use anyhow::Context;
use chrono::Local;
use rustjesse::channel::ChannelClient;
use rustjesse::commands::{AppCommand, HELP};
use rustjesse::config::AppConfig;
use rustjesse::session::{ApiClient, AuthState};
use rustjesse::stores::{FormDefaults, StoreContext};
use rustjesse::{AppEvent, Dashboard, Notifier};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let ts = Local::now().format("%Y%m%d-%H%M%S").to_string();
    let log_dir = std::path::PathBuf::from("logs");
    std::fs::create_dir_all(&log_dir)?;
    let log_path = log_dir.join(format!("app-{}.log", ts));
    let log_file = std::fs::File::create(&log_path)?;
    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(Box::new(log_file))) // 日志只写文件，终端留给控制台
        .filter_level(log::LevelFilter::Warn)
        .filter_module("rustjesse", log::LevelFilter::Info)
        .filter_module("reqwest", log::LevelFilter::Error)
        .filter_module("tungstenite", log::LevelFilter::Error)
        .init();

    // 加载 .env（不存在时直接读系统环境变量）
    match dotenv::dotenv() {
        Ok(path) => println!("✓ 已加载 {}", path.display()),
        Err(_) => println!("⚠ 未找到 .env 文件，使用系统环境变量"),
    }

    let config = AppConfig::from_env().context("读取配置失败")?;
    log::info!("API: {}, 推送通道: {}", config.api_url, config.channel.url);

    let auth = match &config.auth_token {
        Some(token) => AuthState::with_token(token.clone()),
        None => AuthState::new(),
    };
    let api = ApiClient::new(config.api_url.clone(), auth.clone(), config.http_timeout)?;
    println!("✓ {}", api);

    if !auth.is_authenticated() {
        match &config.password {
            Some(password) => match api.login(password).await {
                Ok(()) => println!("✓ 登录成功"),
                Err(e) => println!("✗ 登录失败: {}", e),
            },
            None => println!("⚠ 未设置 JESSE_AUTH_TOKEN 或 JESSE_PASSWORD，推送通道将一直等待登录"),
        }
    }

    let (notifier, mut evt_rx) = Notifier::channel();
    let (push_tx, push_rx) = mpsc::unbounded_channel();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<AppCommand>();

    let mut channel =
        ChannelClient::new(config.channel.clone(), auth.clone(), notifier.clone(), push_tx).spawn();

    let ctx = StoreContext::new(Arc::new(api), notifier)
        .with_defaults(FormDefaults::new(&config.state_dir))
        .with_job_config(config.job_config.clone());
    let dashboard = tokio::spawn(Dashboard::new(ctx).run(push_rx, cmd_rx));

    // 渲染提示
    tokio::spawn(async move {
        while let Some(evt) = evt_rx.recv().await {
            match evt {
                AppEvent::Success(msg) => println!("✓ {}", msg),
                AppEvent::Error(msg) => println!("✗ {}", msg),
                AppEvent::Info(msg) => println!("{}", msg),
            }
        }
    });

    println!("{}", HELP);
    println!("日志文件: {}", log_path.display());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let Ok(cmd) = line.parse::<AppCommand>() else {
            continue;
        };
        let quit = cmd == AppCommand::Quit;
        if cmd_tx.send(cmd).is_err() || quit {
            break;
        }
    }

    drop(cmd_tx);
    if let Err(e) = dashboard.await.map(drop) {
        log::error!("dashboard 任务异常退出: {}", e);
    }
    channel.shutdown();
    println!("再见");
    Ok(())
}
