/*!
Example: create a custom menu, then read it back

Run:
  WX_APP_ID=wx... \
  WX_APP_SECRET=your_appsecret \
  cargo run --example create_menu

Notes:
- Replaces the current menu of the account.
- The `click` button pushes a CLICK event with EventKey=V1001_TODAY_MUSIC
  (see the webhook_server example).
- Clients may take a few minutes to show the change.
*/

use anyhow::{Context, Result};
use dotenvy::dotenv;
use wxapi_rs::{HandlerRegistry, Menu, MenuButton, WxApp, WxConfig, errcode};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let cfg = WxConfig::from_env().context("load config")?;
    let app = WxApp::from_config(&cfg, HandlerRegistry::new()).await?;

    let menu = Menu {
        button: vec![
            MenuButton::click("今日歌曲", "V1001_TODAY_MUSIC"),
            MenuButton::parent(
                "菜单",
                vec![
                    MenuButton::view("搜索", "https://www.soso.com/"),
                    MenuButton::click("赞一下我们", "V1001_GOOD"),
                ],
            ),
        ],
    };

    if let Err(e) = app.create_menu(&menu).await {
        eprintln!("[ERR] create_menu failed: {e}");
        if let wxapi_rs::AppError::Api(api) = &e {
            if let Some(code) = api.wx_code() {
                eprintln!("{}", errcode::explain(code, ""));
            }
        }
        return Err(e.into());
    }
    println!("[OK] menu created");

    let info = app.current_selfmenu_info().await?;
    println!("is_menu_open = {}", info.is_menu_open);
    if let Some(tree) = info.selfmenu_info {
        println!("{}", serde_json::to_string_pretty(&tree)?);
    }

    Ok(())
}
