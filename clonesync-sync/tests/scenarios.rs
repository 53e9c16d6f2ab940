use std::fs;

use clonesync_core::{
    types::{CLONED_FROM_GROUP_KIND_ANNOTATION, CLONED_FROM_NAME_ANNOTATION},
    FileStore, GroupKind, Instance, Lineage, Namespace, ObjectClass, ObjectKey, ObjectStore,
    StoreError, Template,
};
use clonesync_sync::{
    drift::{check, DriftSignal},
    reconcile, sync, LineageMatcher, PatchResult, SyncError,
};
use rstest::rstest;
use tempfile::TempDir;

fn tpl_a(value: bool) -> Template {
    let mut template = Template::new("metal3", "tpl-a");
    template.group_kind = GroupKind::from("infra");
    template.spec.disable_automated_clean = value;
    template
}

fn cloned(name: &str, source: &str, group_kind: &str) -> Instance {
    Instance::new("metal3", name).with_lineage(&Lineage::new(source, group_kind))
}

fn file_store(root: &TempDir) -> FileStore {
    FileStore::at(root.path())
}

#[test]
fn scenario_a_matches_i1_and_i3_and_leaves_i2() {
    let template = tpl_a(true);
    let mut instances = vec![
        cloned("I1", "tpl-a", "infra"),
        cloned("I2", "tpl-b", "infra"),
        cloned("I3", "tpl-a", "infra"),
    ];

    let matched: Vec<String> = LineageMatcher::new(&template)
        .select(&instances)
        .iter()
        .map(|i| i.metadata.name.0.clone())
        .collect();
    assert_eq!(matched, ["I1", "I3"]);

    sync(&template, &mut instances);
    assert!(instances[0].spec.disable_automated_clean);
    assert!(!instances[1].spec.disable_automated_clean, "I2 unchanged");
    assert!(instances[2].spec.disable_automated_clean);
}

#[test]
fn scenario_b_empty_list_is_a_quiet_success() {
    let template = tpl_a(true);
    let mut instances: Vec<Instance> = Vec::new();
    assert!(LineageMatcher::new(&template).select(&instances).is_empty());
    assert!(sync(&template, &mut instances).is_empty());

    let root = TempDir::new().expect("root");
    let store = file_store(&root);
    store.save_template(&template).expect("save template");
    let report = reconcile(&store, &template.key(), false).expect("reconcile");
    assert_eq!(report.candidates, 0);
    assert!(report.matched.is_empty());
    assert!(report.patches.is_empty());
}

#[test]
fn scenario_c_deleted_template_ends_successfully() {
    let root = TempDir::new().expect("root");
    let store = file_store(&root);
    store
        .save_instance(&cloned("I1", "tpl-a", "infra"))
        .expect("save instance");

    let report = reconcile(&store, &ObjectKey::new("metal3", "tpl-a"), false).expect("reconcile");
    assert!(report.template_gone);
    assert_eq!(report.value, None);

    let untouched = store
        .load_instance(&ObjectKey::new("metal3", "I1"))
        .expect("load");
    assert_eq!(untouched.metadata.resource_version, 0);
}

#[rstest]
#[case::different_group("tpl-a", "compute")]
#[case::canonical_vs_bare_group("tpl-a", "MachineTemplate.infra")]
fn scenario_d_same_name_other_group_kind_is_excluded(
    #[case] source: &str,
    #[case] group_kind: &str,
) {
    let template = tpl_a(true);
    let mut instances = vec![cloned("I1", "tpl-a", "infra"), cloned("I4", source, group_kind)];
    let matched = sync(&template, &mut instances);
    assert_eq!(matched.len(), 1);
    assert!(!instances[1].spec.disable_automated_clean);
}

#[test]
fn synchronize_twice_equals_once() {
    let template = tpl_a(true);
    let mut once = vec![cloned("I1", "tpl-a", "infra"), cloned("I2", "tpl-b", "infra")];
    let mut twice = once.clone();

    sync(&template, &mut once);
    sync(&template, &mut twice);
    sync(&template, &mut twice);
    assert_eq!(once, twice);
}

/// Every way an instance can fail to be a clone of `metal3/tpl-a` (infra).
fn non_clones(preset: bool) -> Vec<Instance> {
    let suffix = if preset { "on" } else { "off" };
    let mut name_only = Instance::new("metal3", format!("name-only-{suffix}"));
    name_only
        .metadata
        .annotations
        .insert(CLONED_FROM_NAME_ANNOTATION.into(), "tpl-a".into());
    let mut kind_only = Instance::new("metal3", format!("kind-only-{suffix}"));
    kind_only
        .metadata
        .annotations
        .insert(CLONED_FROM_GROUP_KIND_ANNOTATION.into(), "infra".into());

    let mut instances = vec![
        Instance::new("metal3", format!("bare-{suffix}")),
        name_only,
        kind_only,
        cloned(&format!("wrong-name-{suffix}"), "tpl-b", "infra"),
        cloned(&format!("wrong-kind-{suffix}"), "tpl-a", "compute"),
    ];
    for instance in &mut instances {
        instance.spec.disable_automated_clean = preset;
    }
    instances
}

#[rstest]
#[case::template_true(true)]
#[case::template_false(false)]
fn unmatched_instances_are_never_mutated(#[case] value: bool) {
    let template = tpl_a(value);
    let mut candidates = Vec::new();
    for preset in [true, false] {
        let mut clone = cloned(&format!("clone-{preset}"), "tpl-a", "infra");
        clone.spec.disable_automated_clean = preset;
        candidates.push(clone);
        candidates.extend(non_clones(preset));
    }
    let before = candidates.clone();

    let selected: Vec<ObjectKey> = sync(&template, &mut candidates)
        .iter()
        .map(|i| i.key())
        .collect();
    assert_eq!(
        selected,
        [
            ObjectKey::new("metal3", "clone-true"),
            ObjectKey::new("metal3", "clone-false")
        ]
    );

    for (after, original) in candidates.iter().zip(&before) {
        if selected.contains(&after.key()) {
            assert_eq!(after.spec.disable_automated_clean, value);
            continue;
        }
        assert_eq!(after, original, "{} must not change", after.key());
        assert_eq!(
            serde_yaml::to_string(after).expect("render after"),
            serde_yaml::to_string(original).expect("render before")
        );
    }
}

#[test]
fn end_to_end_on_file_store() {
    let root = TempDir::new().expect("root");
    let store = file_store(&root);
    let template = tpl_a(true);
    store.save_template(&template).expect("save template");
    for instance in [
        cloned("I1", "tpl-a", "infra"),
        cloned("I2", "tpl-b", "infra"),
        cloned("I3", "tpl-a", "infra"),
        Instance::new("metal3", "bare"),
    ] {
        store.save_instance(&instance).expect("save instance");
    }

    assert!(check(&store, &template.key()).expect("check").needs_reconcile());

    let report = reconcile(&store, &template.key(), false).expect("reconcile");
    assert_eq!(report.candidates, 4);
    assert!(report
        .patches
        .iter()
        .all(|p| matches!(p, PatchResult::Patched { resource_version: 1, .. })));

    let stored = store.list_instances(&Namespace::from("metal3")).expect("list");
    let flags: Vec<(String, bool)> = stored
        .iter()
        .map(|i| (i.metadata.name.0.clone(), i.spec.disable_automated_clean))
        .collect();
    assert_eq!(
        flags,
        [
            ("I1".to_string(), true),
            ("I2".to_string(), false),
            ("I3".to_string(), true),
            ("bare".to_string(), false),
        ]
    );
    assert_eq!(
        check(&store, &template.key()).expect("check"),
        DriftSignal::InSync { matched: 2 }
    );

    // Flipping the template back propagates on the next trigger.
    let mut flipped = template.clone();
    flipped.spec.disable_automated_clean = false;
    store.save_template(&flipped).expect("save flipped");
    let report = reconcile(&store, &template.key(), false).expect("reconcile flipped");
    assert_eq!(report.changed(), 2);
    assert!(!store
        .load_instance(&ObjectKey::new("metal3", "I1"))
        .expect("load")
        .spec
        .disable_automated_clean);
}

#[test]
fn dry_run_leaves_files_untouched() {
    let root = TempDir::new().expect("root");
    let store = file_store(&root);
    let template = tpl_a(true);
    store.save_template(&template).expect("save template");
    let instance = cloned("I1", "tpl-a", "infra");
    store.save_instance(&instance).expect("save instance");
    let path = store.object_path(&instance.key(), ObjectClass::Instance);
    let before = fs::read(&path).expect("read");

    let report = reconcile(&store, &template.key(), true).expect("reconcile");
    assert!(matches!(report.patches[0], PatchResult::WouldPatch { .. }));
    assert_eq!(before, fs::read(&path).expect("read after"));
}

#[test]
fn corrupt_candidate_is_a_retrieval_error() {
    let root = TempDir::new().expect("root");
    let store = file_store(&root);
    let template = tpl_a(true);
    store.save_template(&template).expect("save template");
    let path = store.object_path(&ObjectKey::new("metal3", "broken"), ObjectClass::Instance);
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(&path, "metadata: [").expect("write");

    let err = reconcile(&store, &template.key(), false).unwrap_err();
    assert!(
        matches!(err, SyncError::Retrieval(StoreError::Parse { .. })),
        "got: {err}"
    );
}
