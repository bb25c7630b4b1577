mod support;

use std::fs;

use twtools::config::FqlConfig;
use twtools::notes::NotesDir;
use twtools::resolver::{Resolution, ResolveOptions, Resolver, Strategy};
use twtools::task::{Task, TaskStatus};
use twtools::Error;

use support::{at, task};

const WIDGET: &str = "11111111-0000-4000-8000-000000000001";
const GADGET: &str = "22222222-0000-4000-8000-000000000002";
const GIZMO: &str = "33333333-0000-4000-8000-000000000003";

fn store() -> Vec<Task> {
    let mut gadget = task(GADGET, 2, "src.tools", "gadget");
    gadget.modified = at(5);
    let mut gizmo = task(GIZMO, 0, "docs", "gizmo");
    gizmo.status = TaskStatus::Completed;
    gizmo.description = "write the tools guide".to_string();
    vec![task(WIDGET, 1, "src.tools", "widget"), gadget, gizmo]
}

fn unique(resolution: Resolution) -> (Task, Strategy) {
    match resolution {
        Resolution::Unique { task, strategy } => (*task, strategy),
        other => panic!("expected a unique match, got {other:?}"),
    }
}

#[test]
fn every_identity_form_finds_the_same_task() -> Result<(), Box<dyn std::error::Error>> {
    let config = FqlConfig::default();
    let resolver = Resolver::new(&config);
    let tasks = store();

    for (reference, expected) in [
        ("1", Strategy::DisplayId),
        (WIDGET, Strategy::Uuid),
        ("11111111", Strategy::UuidPrefix),
        ("widget", Strategy::Label),
        ("src/tools/widget", Strategy::Fql),
        ("tools/widget", Strategy::FqlSubstring),
        ("WORK ON WIDG", Strategy::Substring),
    ] {
        let (found, strategy) = unique(resolver.resolve(reference, &tasks, ResolveOptions::default())?);
        assert_eq!(found.uuid, WIDGET, "reference {reference}");
        assert_eq!(strategy, expected, "reference {reference}");
    }
    Ok(())
}

#[test]
fn ambiguous_candidates_are_newest_first() -> Result<(), Box<dyn std::error::Error>> {
    let config = FqlConfig::default();
    let resolver = Resolver::new(&config);
    let tasks = store();

    let resolution = resolver.resolve("src/tools", &tasks, ResolveOptions::default())?;
    assert_eq!(resolution.strategy(), Some(Strategy::FqlSubstring));
    let uuids: Vec<&str> = resolution
        .candidates()
        .iter()
        .map(|task| task.uuid.as_str())
        .collect();
    assert_eq!(uuids, vec![GADGET, WIDGET]);

    let err = resolution.into_task("src/tools").expect_err("ambiguous");
    assert!(matches!(err, Error::Ambiguous { ref candidates, .. } if candidates.len() == 2));

    let recent = ResolveOptions {
        prefer_recent: true,
        ..ResolveOptions::default()
    };
    let (found, _) = unique(resolver.resolve("src/tools", &tasks, recent)?);
    assert_eq!(found.uuid, GADGET);
    Ok(())
}

#[test]
fn completed_tasks_need_opt_in() -> Result<(), Box<dyn std::error::Error>> {
    let config = FqlConfig::default();
    let resolver = Resolver::new(&config);
    let tasks = store();

    let hidden = resolver.resolve("gizmo", &tasks, ResolveOptions::default())?;
    assert_eq!(hidden, Resolution::NotFound);

    let all = ResolveOptions {
        include_completed: true,
        ..ResolveOptions::default()
    };
    let (found, strategy) = unique(resolver.resolve("gizmo", &tasks, all)?);
    assert_eq!(found.uuid, GIZMO);
    assert_eq!(strategy, Strategy::Label);
    Ok(())
}

#[test]
fn exact_and_id_only_skip_fallbacks() -> Result<(), Box<dyn std::error::Error>> {
    let config = FqlConfig::default();
    let resolver = Resolver::new(&config);
    let tasks = store();

    let exact = ResolveOptions {
        exact_only: true,
        ..ResolveOptions::default()
    };
    assert_eq!(
        resolver.resolve("tools/widget", &tasks, exact)?,
        Resolution::NotFound
    );

    let id_only = ResolveOptions {
        id_only: true,
        ..ResolveOptions::default()
    };
    assert_eq!(resolver.resolve("widget", &tasks, id_only)?, Resolution::NotFound);
    let (found, _) = unique(resolver.resolve("2", &tasks, id_only)?);
    assert_eq!(found.uuid, GADGET);
    Ok(())
}

#[test]
fn regex_reaches_into_notes() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join(format!("{GADGET}.md")), "Blocked on vendor SDK 4.2\n")?;
    fs::write(dir.path().join(format!("{WIDGET}.txt")), "nothing interesting\n")?;
    let notes = NotesDir::new(dir.path());

    let config = FqlConfig::default();
    let resolver = Resolver::new(&config).with_notes(&notes);
    let tasks = store();
    let regex = ResolveOptions {
        use_regex: true,
        ..ResolveOptions::default()
    };

    let (found, strategy) = unique(resolver.resolve(r"sdk \d\.\d", &tasks, regex)?);
    assert_eq!(found.uuid, GADGET);
    assert_eq!(strategy, Strategy::Regex);

    // Without the flag the same reference stays unmatched.
    assert_eq!(
        resolver.resolve(r"sdk \d\.\d", &tasks, ResolveOptions::default())?,
        Resolution::NotFound
    );
    Ok(())
}

#[test]
fn duplicate_uuid_prefix_is_an_integrity_violation() {
    let config = FqlConfig::default();
    let resolver = Resolver::new(&config);
    let tasks = vec![
        task("abcdef12-0000-4000-8000-000000000001", 1, "a", "x"),
        task("abcdef12-1111-4000-8000-000000000002", 2, "a", "y"),
    ];

    let err = resolver
        .resolve("abcdef12", &tasks, ResolveOptions::default())
        .expect_err("shared prefix");
    assert!(matches!(err, Error::IntegrityViolation { .. }));
}

#[test]
fn blank_reference_is_malformed() {
    let config = FqlConfig::default();
    let resolver = Resolver::new(&config);
    let err = resolver
        .resolve("   ", &store(), ResolveOptions::default())
        .expect_err("blank");
    assert!(matches!(err, Error::MalformedIdentity(_)));
}
