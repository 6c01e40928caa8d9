use clap::{Parser, Subcommand, ValueEnum};
use edu_crm::Store;
use std::collections::HashMap;
use std::process;

/// edu-crm CLI: manage the training-institute CRM store from the command line
#[derive(Parser)]
#[command(name = "edu-crm", version, about)]
struct Cli {
    /// Path to the SQLite store file
    #[arg(long, env = "EDU_CRM_DB", default_value = "crm.db")]
    db: String,

    /// Output format
    #[arg(long, default_value = "yaml")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// List the tables of the schema
    Tables,

    /// Get a single record by id
    Get {
        /// Table name (e.g. customer, class_list)
        table: String,
        /// Record id
        id: i64,
    },

    /// List records in a table
    List {
        /// Table name
        table: String,
        /// Equality filters (e.g. --filter source=referral)
        #[arg(long = "filter", value_parser = parse_key_value)]
        filters: Vec<(String, String)>,
    },

    /// Insert a new record
    Insert {
        /// Table name
        table: String,
        /// Field values (e.g. --field qq=10001 --field tags=1,2)
        #[arg(long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
    },

    /// Update fields of an existing record
    Update {
        /// Table name
        table: String,
        /// Record id
        id: i64,
        /// Field values to change (e.g. --field score=A+)
        #[arg(long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
    },

    /// Delete a record and everything that depends on it
    Delete {
        /// Table name
        table: String,
        /// Record id
        id: i64,
        /// Show what would be deleted without actually deleting
        #[arg(long)]
        dry_run: bool,
    },

    /// Check all stored records against the schema
    Validate,

    /// Show schema hash and record counts
    Status,

    /// Bulk export a table
    Export {
        /// Table name
        table: String,
    },

    /// Print the SQL schema
    Ddl,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("Invalid key=value pair: no '=' found in '{s}'"))?;
    Ok((key.to_string(), value.to_string()))
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("ERROR:{e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let store = Store::open(&cli.db)?;

    match cli.command {
        Command::Tables => {
            let tables: Vec<serde_json::Value> = store
                .schema()
                .tables
                .iter()
                .map(|(name, def)| {
                    serde_json::json!({
                        "name": name,
                        "db_table": def.db_table_name(name),
                        "verbose_name": def.verbose_name,
                        "fields": def.fields.keys().collect::<Vec<_>>(),
                    })
                })
                .collect();
            print_output(&serde_json::Value::Array(tables), &cli.format)?;
        }

        Command::Get { table, id } => {
            let record = store.get_dynamic(&table, id)?;
            print_output(&record, &cli.format)?;
        }

        Command::List { table, filters } => {
            let filter_map: HashMap<String, String> = filters.into_iter().collect();
            let records = store.list_dynamic(&table, &filter_map)?;
            print_output(&records, &cli.format)?;
        }

        Command::Insert { table, fields } => {
            let data = store.coerce_fields(&table, &fields)?;
            let record = store.insert_dynamic(&table, data)?;
            print_output(&record, &cli.format)?;
        }

        Command::Update { table, id, fields } => {
            let data = store.coerce_fields(&table, &fields)?;
            let record = store.update_partial_dynamic(&table, id, data)?;
            print_output(&record, &cli.format)?;
        }

        Command::Delete { table, id, dry_run } => {
            if dry_run {
                let plan = store.delete_plan_dynamic(&table, id)?;
                print_output(
                    &serde_json::json!({ "dry_run": true, "plan": plan }),
                    &cli.format,
                )?;
            } else {
                let plan = store.delete_dynamic(&table, id)?;
                print_output(&serde_json::json!({ "ok": true, "plan": plan }), &cli.format)?;
            }
        }

        Command::Validate => {
            let result = store.validate_all()?;
            print_output(&result, &cli.format)?;
        }

        Command::Status => {
            let result = store.status()?;
            print_output(&result, &cli.format)?;
        }

        Command::Export { table } => {
            let records = store.list_dynamic(&table, &HashMap::new())?;
            print_output(&records, &cli.format)?;
        }

        Command::Ddl => {
            for statement in store.ddl() {
                println!("{statement};\n");
            }
        }
    }

    Ok(())
}

fn print_output(
    value: &serde_json::Value,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("score=A+").unwrap(),
            ("score".to_string(), "A+".to_string())
        );
        assert_eq!(
            parse_key_value("content=a=b").unwrap(),
            ("content".to_string(), "a=b".to_string())
        );
        assert!(parse_key_value("score").is_err());
    }

    #[test]
    fn test_parse_insert_command() {
        let cli = Cli::try_parse_from([
            "edu-crm",
            "--db",
            "test.db",
            "--format",
            "json",
            "insert",
            "tag",
            "--field",
            "name=vip",
        ])
        .unwrap();
        assert_eq!(cli.db, "test.db");
        match cli.command {
            Command::Insert { table, fields } => {
                assert_eq!(table, "tag");
                assert_eq!(fields, vec![("name".to_string(), "vip".to_string())]);
            }
            _ => panic!("expected insert"),
        }
    }

    #[test]
    fn test_run_against_temp_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let db = dir.path().join("crm.db");
        let db = db.to_str().unwrap();

        let parse = |args: &[&str]| {
            let mut argv = vec!["edu-crm", "--db", db, "--format", "json"];
            argv.extend_from_slice(args);
            Cli::try_parse_from(argv).unwrap()
        };

        run(parse(&["insert", "role", "--field", "name=admin"])).unwrap();
        run(parse(&["list", "role", "--filter", "name=admin"])).unwrap();
        run(parse(&["delete", "role", "1", "--dry-run"])).unwrap();
        assert!(run(parse(&["get", "invoice", "1"])).is_err());
    }
}
