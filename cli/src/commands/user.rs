use anyhow::Result;

use weighin_core::service::WeighinService;

use super::helpers::prompt_new_password;

pub(crate) fn cmd_user_add(
    svc: &WeighinService,
    username: &str,
    name: Option<&str>,
    password: Option<String>,
    json: bool,
) -> Result<()> {
    let password = match password {
        Some(p) => p,
        None => prompt_new_password()?,
    };
    let user = svc.register(username, &password, name)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&user)?);
    } else {
        println!("Created user '{}' (id {})", user.username, user.id);
        println!("Select it with --user {} or WEIGHIN_USER={}", user.username, user.username);
    }
    Ok(())
}
