//! CLI output contracts. Each test runs against its own database through a
//! config file, so no XDG directories are touched.

use serde_json::Value;
use tempfile::TempDir;
use vaya::graph::RelationshipKind;
use vaya::tooling::cli::{CliContext, Commands, PersonCommands, PersonFields, SyncCommands, TraversalArgs};
use vaya::{ApiError, SyncError};

fn context(temp: &TempDir) -> CliContext {
    let workspace = temp.path().join("workspace");
    std::fs::create_dir_all(&workspace).unwrap();
    let config_path = temp.path().join("vaya.test.toml");
    std::fs::write(
        &config_path,
        format!(
            "[storage]\ndata_path = \"{}\"\n\n[logging]\nenabled = false\n",
            temp.path().join("db").display()
        ),
    )
    .unwrap();
    CliContext::new(workspace, Some(config_path))
        .unwrap()
        .with_family("contract")
}

fn json(output: &str) -> Value {
    serde_json::from_str(output).unwrap()
}

fn add_person(cli: &CliContext, name: &str) -> String {
    let output = cli
        .execute(&Commands::Person {
            command: PersonCommands::Add {
                name: name.to_string(),
                fields: PersonFields::default(),
                format: "json".to_string(),
            },
        })
        .unwrap();
    json(&output)["id"].as_str().unwrap().to_string()
}

fn relate(cli: &CliContext, source: &str, target: &str) -> String {
    let output = cli
        .execute(&Commands::Relate {
            source: source.to_string(),
            target: target.to_string(),
            kind: RelationshipKind::ParentChild,
            metadata: Vec::new(),
            format: "json".to_string(),
        })
        .unwrap();
    json(&output)["id"].as_str().unwrap().to_string()
}

#[test]
fn person_add_json_contract() {
    let temp = TempDir::new().unwrap();
    let cli = context(&temp);
    let output = cli
        .execute(&Commands::Person {
            command: PersonCommands::Add {
                name: "Esi Mensah".to_string(),
                fields: PersonFields {
                    role: Some("grandmother".to_string()),
                    attributes: vec![("village".to_string(), Value::String("Elmina".to_string()))],
                    ..PersonFields::default()
                },
                format: "json".to_string(),
            },
        })
        .unwrap();

    let parsed = json(&output);
    assert!(parsed.get("id").and_then(|v| v.as_str()).is_some());
    assert_eq!(parsed["data"]["full_name"], "Esi Mensah");
    assert_eq!(parsed["data"]["role"], "grandmother");
    assert_eq!(parsed["data"]["village"], "Elmina");
}

#[test]
fn ancestors_json_lists_people_in_generation_order() {
    let temp = TempDir::new().unwrap();
    let cli = context(&temp);
    let grandparent = add_person(&cli, "Grandparent");
    let parent = add_person(&cli, "Parent");
    let child = add_person(&cli, "Child");
    relate(&cli, &parent, &child);
    relate(&cli, &grandparent, &parent);

    let output = cli
        .execute(&Commands::Ancestors {
            person: child.clone(),
            traversal: TraversalArgs::default(),
            format: "json".to_string(),
        })
        .unwrap();
    let parsed = json(&output);
    assert_eq!(parsed["total"], 2);
    let ids: Vec<&str> = parsed["people"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![parent.as_str(), grandparent.as_str()]);

    let unknown = cli.execute(&Commands::Descendants {
        person: "nobody".to_string(),
        traversal: TraversalArgs::default(),
        format: "json".to_string(),
    });
    assert!(matches!(unknown, Err(ApiError::PersonNotFound(_))));
}

#[test]
fn validate_reports_dangling_relationships() {
    let temp = TempDir::new().unwrap();
    let cli = context(&temp);
    let only = add_person(&cli, "Only Child");
    let dangling = relate(&cli, "absent-parent", &only);

    let parsed = json(
        &cli.execute(&Commands::Validate {
            format: "json".to_string(),
        })
        .unwrap(),
    );
    assert_eq!(parsed["valid"], false);
    assert_eq!(parsed["people"], 1);
    assert_eq!(parsed["relationships"], 1);
    assert_eq!(parsed["dangling"][0]["id"], dangling.as_str());

    cli.execute(&Commands::Unrelate { id: dangling }).unwrap();
    let parsed = json(
        &cli.execute(&Commands::Validate {
            format: "json".to_string(),
        })
        .unwrap(),
    );
    assert_eq!(parsed["valid"], true);
}

#[test]
fn person_remove_cascades_and_queues_deletes() {
    let temp = TempDir::new().unwrap();
    let cli = context(&temp);
    let parent = add_person(&cli, "Parent");
    let child = add_person(&cli, "Child");
    relate(&cli, &parent, &child);

    let parsed = json(
        &cli.execute(&Commands::Person {
            command: PersonCommands::Remove {
                id: parent.clone(),
                format: "json".to_string(),
            },
        })
        .unwrap(),
    );
    assert_eq!(parsed["person"]["id"], parent.as_str());
    assert_eq!(parsed["removed_relationships"].as_array().unwrap().len(), 1);

    let status = json(
        &cli.execute(&Commands::Sync {
            command: SyncCommands::Status {
                format: "json".to_string(),
            },
        })
        .unwrap(),
    );
    // 2 person inserts, 1 edge insert, person delete, cascaded edge delete
    assert_eq!(status["stats"]["pending"], 5);
    assert_eq!(status["stats"]["total"], 5);
    let records = status["records"].as_array().unwrap();
    assert_eq!(records[3]["operation"], "delete");
    assert_eq!(records[3]["table"], "family_members");
    assert_eq!(records[4]["table"], "family_relationships");
}

#[test]
fn flush_requires_a_remote_url() {
    let temp = TempDir::new().unwrap();
    let cli = context(&temp);
    add_person(&cli, "Queued");
    let result = cli.execute(&Commands::Sync {
        command: SyncCommands::Flush {
            format: "json".to_string(),
        },
    });
    assert!(matches!(result, Err(ApiError::Sync(SyncError::NotConfigured(_)))));
    assert_eq!(cli.queue().stats().pending, 1);
}

#[test]
fn families_and_config_commands() {
    let temp = TempDir::new().unwrap();
    let cli = context(&temp);
    add_person(&cli, "Someone");

    let families = json(
        &cli.execute(&Commands::Families {
            format: "json".to_string(),
        })
        .unwrap(),
    );
    assert_eq!(families["families"][0], "contract");

    let config = cli.execute(&Commands::Config).unwrap();
    assert!(config.contains("[sync]"));
    assert!(config.contains("max_retries = 3"));
    assert_eq!(cli.data_path(), temp.path().join("db").as_path());
}
