use crate::output::{print_json, print_table};
use crate::wiring::Wiring;
use clap::Subcommand;
use lifecycle_core::config::Settings;

#[derive(Subcommand)]
pub enum ReposSubcommand {
    /// List the opted-in repos from the last refresh
    List,
}

pub fn run(settings: &Settings, subcmd: ReposSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ReposSubcommand::List => list(settings, json),
    }
}

fn list(settings: &Settings, json: bool) -> anyhow::Result<()> {
    let wiring = Wiring::open(settings.clone())?;
    let map = wiring.repo_maps()?.load()?;

    if json {
        let value = match &map {
            Some(map) => serde_json::json!({
                "validation_tag": map.validation_tag,
                "repos": map.repos,
            }),
            None => serde_json::Value::Null,
        };
        return print_json(&value);
    }

    let Some(map) = map else {
        println!("Repo directory has not been populated yet. Run `lifecycle refresh`.");
        return Ok(());
    };
    println!("Tag: {}", map.validation_tag.as_deref().unwrap_or("-"));
    let rows = map
        .repos
        .iter()
        .map(|r| {
            vec![
                r.name.clone(),
                r.default_branch.clone(),
                r.topics.iter().cloned().collect::<Vec<_>>().join(","),
            ]
        })
        .collect();
    print_table(&["REPO", "BRANCH", "TOPICS"], rows);
    Ok(())
}
