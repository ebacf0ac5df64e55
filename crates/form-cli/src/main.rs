use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use component_form::get_offered_actions;
use form_spec::persist::{self, PersistFormat};
use form_spec::record_schema::{action_catalog_schema, form_authoring_schema};
use form_spec::{
    DeclarationRecord, EngineOptions, FormSpec, LocationTree, PublishedForm, ValidationResult,
    VisibilityMode, build_summary, cleared_fields, field_options, get_visible_fields, publish,
    record_schema, render_summary_text, resolve_visibility, validate,
};
use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Declarative form schema checker and evaluator",
    long_about = "Publishes form schemas, evaluates visibility and validation for declaration records, and resolves offered actions"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ModeArg {
    /// Hidden fields read as absent to dependent conditionals.
    Cascade,
    /// Conditionals read the raw record.
    Snapshot,
}

impl From<ModeArg> for VisibilityMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Cascade => VisibilityMode::Cascade,
            ModeArg::Snapshot => VisibilityMode::Snapshot,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum SchemaKind {
    /// Authoring schema of form definitions.
    Form,
    /// Authoring schema of action catalogs.
    Catalog,
    /// Record schema of a form's currently visible fields.
    Record,
}

#[derive(Args)]
struct EvalArgs {
    /// Form definition (`.json` or `.cbor`).
    #[arg(long, value_name = "FORM")]
    form: PathBuf,
    /// Declaration record JSON; an empty record when omitted.
    #[arg(long, value_name = "RECORD")]
    record: Option<PathBuf>,
    /// Location hierarchy JSON used for location options.
    #[arg(long, value_name = "LOCATIONS")]
    locations: Option<PathBuf>,
    /// Evaluation date; defaults to today (UTC).
    #[arg(long, env = "DECLFORM_TODAY", value_name = "YYYY-MM-DD")]
    today: Option<NaiveDate>,
    #[arg(long, value_enum, default_value_t = ModeArg::Cascade)]
    mode: ModeArg,
}

#[derive(Subcommand)]
enum Command {
    /// Run every publish check against a form definition.
    Check {
        #[arg(long, value_name = "FORM")]
        form: PathBuf,
    },
    /// List the fields visible for a record.
    Visible {
        #[command(flatten)]
        eval: EvalArgs,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Validate a record; exits non-zero when it is invalid.
    Validate {
        #[command(flatten)]
        eval: EvalArgs,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// List the actions offered to a user for an event.
    Actions {
        #[arg(long, value_name = "CATALOG")]
        catalog: PathBuf,
        #[arg(long, value_name = "USER")]
        user: PathBuf,
        #[arg(long, value_name = "EVENT")]
        event: PathBuf,
        #[arg(long, env = "DECLFORM_TODAY", value_name = "YYYY-MM-DD")]
        today: Option<NaiveDate>,
    },
    /// Print the review summary of a record.
    Review {
        #[command(flatten)]
        eval: EvalArgs,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// List the options a select or location field currently offers.
    Options {
        #[command(flatten)]
        eval: EvalArgs,
        #[arg(long, value_name = "FIELD")]
        field: String,
    },
    /// Print a JSON Schema.
    Schema {
        #[arg(long, value_enum, default_value_t = SchemaKind::Form)]
        kind: SchemaKind,
        /// Form definition, required for record schemas.
        #[arg(long, value_name = "FORM")]
        form: Option<PathBuf>,
        #[arg(long, value_name = "RECORD")]
        record: Option<PathBuf>,
        #[arg(long, env = "DECLFORM_TODAY", value_name = "YYYY-MM-DD")]
        today: Option<NaiveDate>,
        #[arg(long, value_enum, default_value_t = ModeArg::Cascade)]
        mode: ModeArg,
    },
    /// Convert a form definition between JSON and CBOR by file extension.
    Convert {
        #[arg(long, value_name = "INPUT")]
        input: PathBuf,
        #[arg(long, value_name = "OUTPUT")]
        output: PathBuf,
    },
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Check { form } => run_check(&form),
        Command::Visible { eval, format } => run_visible(&eval, format),
        Command::Validate { eval, format } => run_validate(&eval, format),
        Command::Actions {
            catalog,
            user,
            event,
            today,
        } => run_actions(&catalog, &user, &event, today),
        Command::Review { eval, format } => run_review(&eval, format),
        Command::Options { eval, field } => run_options(&eval, &field),
        Command::Schema {
            kind,
            form,
            record,
            today,
            mode,
        } => run_schema(kind, form, record, engine_options(today, mode, None)),
        Command::Convert { input, output } => run_convert(&input, &output),
    }
}

fn read_spec(path: &Path) -> CliResult<FormSpec> {
    let bytes = fs::read(path)?;
    Ok(persist::decode(&bytes, PersistFormat::from_path(path))?)
}

fn load_form(path: &Path) -> CliResult<PublishedForm> {
    let form = publish(read_spec(path)?)?;
    tracing::debug!(form = form.id(), version = form.version(), "form published");
    Ok(form)
}

fn load_record(form: &PublishedForm, path: Option<&Path>) -> CliResult<DeclarationRecord> {
    let values = match path {
        Some(path) => {
            let bytes = fs::read(path)?;
            persist::decode::<Value>(&bytes, PersistFormat::from_path(path))?
        }
        None => json!({}),
    };
    Ok(form.record_from_json(&values))
}

fn load_locations(path: Option<&Path>) -> CliResult<Option<LocationTree>> {
    match path {
        Some(path) => Ok(Some(serde_json::from_str(&fs::read_to_string(path)?)?)),
        None => Ok(None),
    }
}

/// Engine settings from the shared `--today` / `--mode` flags.
fn engine_options<'a>(
    today: Option<NaiveDate>,
    mode: ModeArg,
    locations: Option<&'a LocationTree>,
) -> EngineOptions<'a> {
    let options = EngineOptions::new(today.unwrap_or_else(|| Utc::now().date_naive()))
        .with_mode(mode.into());
    match locations {
        Some(locations) => options.with_locations(locations),
        None => options,
    }
}

/// Form, record and location data for one evaluation command.
struct Session {
    form: PublishedForm,
    record: DeclarationRecord,
    locations: Option<LocationTree>,
    today: Option<NaiveDate>,
    mode: ModeArg,
}

impl Session {
    fn load(args: &EvalArgs) -> CliResult<Self> {
        let form = load_form(&args.form)?;
        let record = load_record(&form, args.record.as_deref())?;
        Ok(Self {
            form,
            record,
            locations: load_locations(args.locations.as_deref())?,
            today: args.today,
            mode: args.mode,
        })
    }

    fn options(&self) -> EngineOptions<'_> {
        engine_options(self.today, self.mode, self.locations.as_ref())
    }
}

fn print_json(value: &impl serde::Serialize) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_check(path: &Path) -> CliResult<()> {
    let spec = read_spec(path)?;
    match publish(spec) {
        Ok(form) => {
            println!(
                "Form {} v{}: {} fields on {} pages, no schema errors",
                form.id(),
                form.version(),
                form.index().len(),
                form.spec().pages.len()
            );
            Ok(())
        }
        Err(errors) => {
            println!("Schema errors:");
            for error in errors.iter() {
                println!("  - {}", error);
            }
            Err("schema check failed".into())
        }
    }
}

fn run_visible(args: &EvalArgs, format: OutputFormat) -> CliResult<()> {
    let session = Session::load(args)?;
    let options = session.options();
    let visible = get_visible_fields(&session.form, &session.record, &options)?;
    let cleared = cleared_fields(&session.form, &session.record, &options)?;
    match format {
        OutputFormat::Json => print_json(&json!({ "visible": visible, "cleared": cleared })),
        OutputFormat::Text => {
            for id in &visible {
                println!("{}", id);
            }
            if !cleared.is_empty() {
                println!("Hidden fields holding values: {}", cleared.join(", "));
            }
            Ok(())
        }
    }
}

fn run_validate(args: &EvalArgs, format: OutputFormat) -> CliResult<()> {
    let session = Session::load(args)?;
    let result = validate(&session.form, &session.record, &session.options())?;
    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Text => {
            println!(
                "Validation result: {}",
                if result.valid { "valid" } else { "invalid" }
            );
            describe_validation(&result);
        }
    }

    if result.valid {
        Ok(())
    } else {
        Err("validation failed".into())
    }
}

fn describe_validation(result: &ValidationResult) {
    if !result.errors.is_empty() {
        println!("Errors:");
        for error in &result.errors {
            println!(
                "  {} - {} ({})",
                error.field_id,
                error.message,
                error.code.as_str()
            );
        }
    }
    if !result.missing_required.is_empty() {
        println!(
            "Missing required fields: {}",
            result.missing_required.join(", ")
        );
    }
    if !result.unknown_fields.is_empty() {
        println!("Unknown record fields: {}", result.unknown_fields.join(", "));
    }
}

fn run_actions(
    catalog: &Path,
    user: &Path,
    event: &Path,
    today: Option<NaiveDate>,
) -> CliResult<()> {
    let config = match today {
        Some(today) => json!({ "today": today }).to_string(),
        None => String::new(),
    };
    let response = get_offered_actions(
        &fs::read_to_string(catalog)?,
        &fs::read_to_string(user)?,
        &fs::read_to_string(event)?,
        &config,
    );
    let parsed: Value = serde_json::from_str(&response)?;
    if let Some(error) = parsed.get("error").and_then(Value::as_str) {
        return Err(error.to_string().into());
    }
    let actions = parsed.as_array().cloned().unwrap_or_default();
    if actions.is_empty() {
        println!("No actions offered.");
    }
    for action in actions {
        if let Some(action) = action.as_str() {
            println!("{}", action);
        }
    }
    Ok(())
}

fn run_review(args: &EvalArgs, format: OutputFormat) -> CliResult<()> {
    let session = Session::load(args)?;
    let summary = build_summary(&session.form, &session.record, &session.options())?;
    match format {
        OutputFormat::Json => print_json(&summary),
        OutputFormat::Text => {
            println!("{}", render_summary_text(&summary));
            Ok(())
        }
    }
}

fn run_options(args: &EvalArgs, field: &str) -> CliResult<()> {
    let session = Session::load(args)?;
    let options = field_options(&session.form, &session.record, field, &session.options())?;
    if options.is_empty() {
        println!("No options available for {}.", field);
    }
    for option in options {
        println!("{}\t{}", option.value, option.label);
    }
    Ok(())
}

fn run_schema(
    kind: SchemaKind,
    form: Option<PathBuf>,
    record: Option<PathBuf>,
    options: EngineOptions<'_>,
) -> CliResult<()> {
    let schema = match kind {
        SchemaKind::Form => form_authoring_schema(),
        SchemaKind::Catalog => action_catalog_schema(),
        SchemaKind::Record => {
            let path = form.ok_or("--form is required for record schemas")?;
            let form = load_form(&path)?;
            let record = load_record(&form, record.as_deref())?;
            let visibility = resolve_visibility(&form, &record, &options)?;
            record_schema(&form, &visibility)
        }
    };
    print_json(&schema)
}

fn run_convert(input: &Path, output: &Path) -> CliResult<()> {
    let spec = read_spec(input)?;
    let bytes = persist::encode(&spec, PersistFormat::from_path(output))?;
    fs::write(output, &bytes)?;
    println!("Wrote {} ({} bytes)", output.display(), bytes.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_cmd::Command;
    use serde_json::{Value, json};
    use std::fs;
    use tempfile::TempDir;

    fn fixture(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../form-spec/tests/fixtures")
            .join(name)
    }

    fn write_json(dir: &Path, name: &str, value: &Value) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, value.to_string()).expect("write fixture");
        path
    }

    fn stdout_of(cmd: &mut Command) -> String {
        let output = cmd.output().expect("run declform");
        String::from_utf8(output.stdout).expect("utf8")
    }

    #[test]
    fn mode_arg_maps_to_visibility_mode() {
        assert_eq!(VisibilityMode::from(ModeArg::Snapshot), VisibilityMode::Snapshot);
        assert_eq!(VisibilityMode::from(ModeArg::Cascade), VisibilityMode::Cascade);
    }

    #[test]
    fn check_accepts_the_membership_form() -> Result<(), Box<dyn std::error::Error>> {
        let mut cmd = Command::cargo_bin("declform")?;
        let assert = cmd
            .arg("check")
            .arg("--form")
            .arg(fixture("membership_form.json"))
            .assert()
            .success();
        let stdout = String::from_utf8(assert.get_output().stdout.clone())?;
        assert!(stdout.contains("Form membership v1.0.0"));
        Ok(())
    }

    #[test]
    fn check_lists_schema_errors() -> Result<(), Box<dyn std::error::Error>> {
        let workspace = TempDir::new()?;
        let form = write_json(
            workspace.path(),
            "broken.json",
            &json!({
                "id": "broken",
                "version": "1",
                "pages": [{
                    "id": "p",
                    "title": "P",
                    "fields": [
                        { "id": "a", "type": "text" },
                        { "id": "a", "type": "text" }
                    ]
                }]
            }),
        );
        let mut cmd = Command::cargo_bin("declform")?;
        cmd.arg("check").arg("--form").arg(&form);
        let stdout = stdout_of(&mut cmd);
        assert!(stdout.contains("field id 'a' is declared more than once"));
        cmd.assert().failure();
        Ok(())
    }

    #[test]
    fn validate_uses_the_configured_date() -> Result<(), Box<dyn std::error::Error>> {
        let workspace = assert_fs::TempDir::new()?;
        let record = write_json(
            workspace.path(),
            "record.json",
            &json!({ "applicant.dob": "2024-06-16" }),
        );
        let mut cmd = Command::cargo_bin("declform")?;
        cmd.env("DECLFORM_TODAY", "2024-06-15")
            .arg("validate")
            .arg("--form")
            .arg(fixture("membership_form.json"))
            .arg("--record")
            .arg(&record);
        let stdout = stdout_of(&mut cmd);
        assert!(stdout.contains("Validation result: invalid"));
        assert!(stdout.contains("applicant.dob - Must be a valid date in the past (rule)"));
        assert!(stdout.contains("Missing required fields: applicant.name"));
        cmd.assert().failure();

        let mut cmd = Command::cargo_bin("declform")?;
        cmd.arg("validate")
            .arg("--form")
            .arg(fixture("membership_form.json"))
            .arg("--record")
            .arg(&record)
            .arg("--today")
            .arg("2024-06-16");
        assert!(!stdout_of(&mut cmd).contains("Must be a valid date in the past"));
        Ok(())
    }

    #[test]
    fn visible_json_reports_cleared_fields() -> Result<(), Box<dyn std::error::Error>> {
        let workspace = TempDir::new()?;
        let record = write_json(
            workspace.path(),
            "record.json",
            &json!({ "applicant.membershipType": "STANDARD", "applicant.school": "Uni" }),
        );
        let mut cmd = Command::cargo_bin("declform")?;
        let assert = cmd
            .arg("visible")
            .arg("--form")
            .arg(fixture("membership_form.json"))
            .arg("--record")
            .arg(&record)
            .arg("--format")
            .arg("json")
            .assert()
            .success();
        let parsed: Value = serde_json::from_slice(&assert.get_output().stdout)?;
        assert_eq!(parsed["cleared"], json!(["applicant.school"]));
        assert!(
            parsed["visible"]
                .as_array()
                .is_some_and(|ids| ids.iter().any(|id| id == "applicant.membershipType"))
        );
        Ok(())
    }

    #[test]
    fn actions_lists_offered_action_types() -> Result<(), Box<dyn std::error::Error>> {
        let workspace = TempDir::new()?;
        let user = write_json(
            workspace.path(),
            "user.json",
            &json!({ "id": "registrar", "scopes": ["record.register", "record.print"] }),
        );
        let event = write_json(
            workspace.path(),
            "event.json",
            &json!({ "type": "membership", "actions": [{ "type": "DECLARE" }] }),
        );
        let mut cmd = Command::cargo_bin("declform")?;
        let assert = cmd
            .arg("actions")
            .arg("--catalog")
            .arg(fixture("membership_actions.json"))
            .arg("--user")
            .arg(&user)
            .arg("--event")
            .arg(&event)
            .assert()
            .success();
        let stdout = String::from_utf8(assert.get_output().stdout.clone())?;
        assert_eq!(stdout.trim(), "REGISTER");
        Ok(())
    }

    #[test]
    fn options_resolve_child_locations() -> Result<(), Box<dyn std::error::Error>> {
        let workspace = TempDir::new()?;
        let record = write_json(
            workspace.path(),
            "record.json",
            &json!({
                "applicant.address.country": "FAR",
                "applicant.address.province": "Sulaka"
            }),
        );
        let mut cmd = Command::cargo_bin("declform")?;
        let assert = cmd
            .arg("options")
            .arg("--form")
            .arg(fixture("membership_form.json"))
            .arg("--record")
            .arg(&record)
            .arg("--locations")
            .arg(fixture("locations.json"))
            .arg("--field")
            .arg("applicant.address.district")
            .assert()
            .success();
        let stdout = String::from_utf8(assert.get_output().stdout.clone())?;
        let values = stdout
            .lines()
            .filter_map(|line| line.split('\t').next())
            .collect::<Vec<_>>();
        assert_eq!(values, vec!["Ilanga", "Irundu", "Zobwe"]);
        Ok(())
    }

    #[test]
    fn convert_round_trips_through_cbor() -> Result<(), Box<dyn std::error::Error>> {
        let workspace = assert_fs::TempDir::new()?;
        let cbor = workspace.path().join("membership.cbor");
        let back = workspace.path().join("membership.json");

        Command::cargo_bin("declform")?
            .arg("convert")
            .arg("--input")
            .arg(fixture("membership_form.json"))
            .arg("--output")
            .arg(&cbor)
            .assert()
            .success();
        Command::cargo_bin("declform")?
            .arg("check")
            .arg("--form")
            .arg(&cbor)
            .assert()
            .success();
        Command::cargo_bin("declform")?
            .arg("convert")
            .arg("--input")
            .arg(&cbor)
            .arg("--output")
            .arg(&back)
            .assert()
            .success();

        let original: FormSpec =
            serde_json::from_str(&fs::read_to_string(fixture("membership_form.json"))?)?;
        let restored: FormSpec = serde_json::from_str(&fs::read_to_string(&back)?)?;
        assert_eq!(original, restored);
        Ok(())
    }

    #[test]
    fn schema_prints_authoring_and_record_schemas() -> Result<(), Box<dyn std::error::Error>> {
        let mut cmd = Command::cargo_bin("declform")?;
        let assert = cmd.arg("schema").assert().success();
        let schema: Value = serde_json::from_slice(&assert.get_output().stdout)?;
        assert_eq!(schema["title"], "FormSpec");

        let mut cmd = Command::cargo_bin("declform")?;
        let assert = cmd
            .arg("schema")
            .arg("--kind")
            .arg("record")
            .arg("--form")
            .arg(fixture("membership_form.json"))
            .assert()
            .success();
        let schema: Value = serde_json::from_slice(&assert.get_output().stdout)?;
        assert!(schema["properties"]["applicant.nid"].is_object());

        Command::cargo_bin("declform")?
            .arg("schema")
            .arg("--kind")
            .arg("record")
            .assert()
            .failure();
        Ok(())
    }

    #[test]
    fn record_schema_honors_date_and_mode() -> Result<(), Box<dyn std::error::Error>> {
        let workspace = TempDir::new()?;
        let form = write_json(
            workspace.path(),
            "renewal.json",
            &json!({
                "id": "renewal",
                "version": "1",
                "pages": [{
                    "id": "main",
                    "title": "Main",
                    "fields": [
                        { "id": "flag", "type": "checkbox" },
                        {
                            "id": "a",
                            "type": "text",
                            "conditionals": [{
                                "type": "HIDE",
                                "expression": {
                                    "op": "eq",
                                    "left": { "field": "flag" },
                                    "right": { "value": true }
                                }
                            }]
                        },
                        {
                            "id": "b",
                            "type": "text",
                            "conditionals": [{
                                "type": "SHOW",
                                "expression": {
                                    "op": "eq",
                                    "left": { "field": "a" },
                                    "right": { "value": "yes" }
                                }
                            }]
                        },
                        {
                            "id": "renewal",
                            "type": "text",
                            "conditionals": [{
                                "type": "SHOW",
                                "expression": {
                                    "op": "is_before",
                                    "operand": { "value": "2024-06-15" },
                                    "bound": { "kind": "now" }
                                }
                            }]
                        }
                    ]
                }]
            }),
        );
        let record = write_json(
            workspace.path(),
            "record.json",
            &json!({ "flag": true, "a": "yes" }),
        );
        let properties = |args: &[&str], today: &str| -> Result<Value, Box<dyn std::error::Error>> {
            let mut cmd = Command::cargo_bin("declform")?;
            let assert = cmd
                .env("DECLFORM_TODAY", today)
                .arg("schema")
                .arg("--kind")
                .arg("record")
                .arg("--form")
                .arg(&form)
                .arg("--record")
                .arg(&record)
                .args(args)
                .assert()
                .success();
            let schema: Value = serde_json::from_slice(&assert.get_output().stdout)?;
            Ok(schema["properties"].clone())
        };

        let cascade = properties(&[], "2024-06-14")?;
        assert!(cascade.get("b").is_none());
        assert!(cascade.get("renewal").is_none());

        let snapshot = properties(&["--mode", "snapshot"], "2024-06-20")?;
        assert!(snapshot.get("b").is_some());
        assert!(snapshot.get("renewal").is_some());

        let overridden = properties(&["--today", "2024-06-14"], "2024-06-20")?;
        assert!(overridden.get("renewal").is_none());
        Ok(())
    }

    #[test]
    fn review_renders_text_summary() -> Result<(), Box<dyn std::error::Error>> {
        let workspace = TempDir::new()?;
        let record = write_json(
            workspace.path(),
            "record.json",
            &json!({ "applicant.membershipType": "STUDENT" }),
        );
        let mut cmd = Command::cargo_bin("declform")?;
        let assert = cmd
            .arg("review")
            .arg("--form")
            .arg(fixture("membership_form.json"))
            .arg("--record")
            .arg(&record)
            .assert()
            .success();
        let stdout = String::from_utf8(assert.get_output().stdout.clone())?;
        assert!(stdout.contains("Status: incomplete"));
        assert!(stdout.contains("Membership type: Student"));
        assert!(!stdout.contains("Guardian"));
        Ok(())
    }
}
