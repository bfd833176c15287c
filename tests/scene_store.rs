//! Write/read round trips through `FileSceneStore`.

use scenecache::prelude::*;
use scenecache::util::{DMat4, DVec3};

type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

fn points(max: f64) -> Data {
    Data::V3dArray(vec![DVec3::ZERO, DVec3::splat(max)])
}

/// `/arm` translated along x, holding points animated over [0, 1].
fn write_arm(file: &std::path::Path) -> scenecache::Result<()> {
    let root = FileSceneStore::create(file)?;
    root.write_tags(&["shot".to_string()])?;
    let arm = root.create_child("arm")?;
    arm.write_transform(&Transform::from_translation(DVec3::new(1.0, 0.0, 0.0)), 0.0)?;
    arm.write_transform(&Transform::from_translation(DVec3::new(3.0, 0.0, 0.0)), 1.0)?;
    arm.write_object(&points(1.0), 0.0)?;
    arm.write_object(&points(2.0), 1.0)?;
    arm.write_attribute("user:speed", &Data::Float(2.0), 0.0)?;
    arm.write_tags(&["geo".to_string(), "visible".to_string()])?;
    arm.create_child("hand")?.write_tags(&["leaf".to_string()])?;
    Ok(())
}

#[test]
fn test_round_trip() -> TestResult {
    let dir = tempfile::tempdir()?;
    let file = dir.path().join("arm.scc");
    write_arm(&file)?;

    let root = FileSceneStore::open(&file)?;
    assert_eq!(root.child_names()?, vec!["arm"]);
    let arm = root.child("arm", MissingBehaviour::ThrowIfMissing)?.ok_or("arm")?;
    assert_eq!(arm.path().to_string(), "/arm");
    assert_eq!(arm.name(), "arm");
    assert_eq!(arm.num_object_samples(), 2);
    assert_eq!(arm.read_object(1.0)?, points(2.0));
    assert_eq!(arm.read_attribute("user:speed", 0.5)?, Data::Float(2.0));
    assert_eq!(arm.attribute_names(), vec!["user:speed"]);
    assert!(matches!(
        arm.read_attribute("user:missing", 0.0),
        Err(Error::AttributeNotFound { .. })
    ));

    let hand = root.scene(&Path::parse("/arm/hand"), MissingBehaviour::ThrowIfMissing)?.ok_or("hand")?;
    assert_eq!(hand.read_tags(TagFilter::ANCESTOR)?, vec!["geo", "shot", "visible"]);
    assert_eq!(root.read_tags(TagFilter::DESCENDANT)?, vec!["geo", "leaf", "visible"]);
    assert!(root.has_tag("leaf", TagFilter::DESCENDANT)?);
    assert!(!root.has_tag("leaf", TagFilter::LOCAL)?);
    Ok(())
}

#[test]
fn test_bound_propagation() -> TestResult {
    let dir = tempfile::tempdir()?;
    let file = dir.path().join("arm.scc");
    write_arm(&file)?;

    let root = FileSceneStore::open(&file)?;
    let arm = root.child("arm", MissingBehaviour::ThrowIfMissing)?.ok_or("arm")?;

    // Local bound comes from the object.
    assert_eq!(arm.read_bound(0.0)?, BBox3d::new(DVec3::ZERO, DVec3::ONE));
    // Root bound is the child's bound in root space.
    assert_eq!(
        root.read_bound(0.0)?,
        BBox3d::new(DVec3::new(1.0, 0.0, 0.0), DVec3::new(2.0, 1.0, 1.0))
    );
    assert_eq!(
        root.read_bound(1.0)?,
        BBox3d::new(DVec3::new(3.0, 0.0, 0.0), DVec3::new(5.0, 2.0, 2.0))
    );
    // Leaf without object or bound contributes nothing.
    let hand = arm.child("hand", MissingBehaviour::ThrowIfMissing)?.ok_or("hand")?;
    assert!(!hand.has_bound());
    Ok(())
}

#[test]
fn test_explicit_bound_wins() -> TestResult {
    let dir = tempfile::tempdir()?;
    let file = dir.path().join("explicit.scc");
    let explicit = BBox3d::new(DVec3::splat(-1.0), DVec3::splat(1.0));
    {
        let root = FileSceneStore::create(&file)?;
        root.write_bound(&explicit, 0.0)?;
        let big = root.create_child("big")?;
        big.write_object(&points(100.0), 0.0)?;
    }
    let root = FileSceneStore::open(&file)?;
    assert_eq!(root.num_bound_samples(), 1);
    assert_eq!(root.read_bound(0.0)?, explicit);
    Ok(())
}

#[test]
fn test_interpolated_reads() -> TestResult {
    let dir = tempfile::tempdir()?;
    let file = dir.path().join("arm.scc");
    write_arm(&file)?;

    let root = FileSceneStore::open(&file)?;
    let arm = root.child("arm", MissingBehaviour::ThrowIfMissing)?.ok_or("arm")?;

    assert_eq!(arm.read_object(0.5)?, points(1.5));
    let m = arm.read_transform_as_matrix(0.5)?;
    assert_eq!(m, DMat4::from_translation(DVec3::new(2.0, 0.0, 0.0)));
    assert_eq!(
        arm.read_bound(0.25)?,
        BBox3d::new(DVec3::ZERO, DVec3::splat(1.25))
    );

    // Outside the sampled range reads clamp to the end samples.
    assert_eq!(arm.read_object(-3.0)?, points(1.0));
    assert_eq!(arm.read_object(42.0)?, points(2.0));
    Ok(())
}

#[test]
fn test_time_tables_shared() -> TestResult {
    let dir = tempfile::tempdir()?;
    let file = dir.path().join("arm.scc");
    write_arm(&file)?;

    let root = FileSceneStore::open(&file)?;
    let tables = root.sample_time_tables()?;
    assert!(tables.contains(&vec![0.0, 1.0]));
    assert!(tables.contains(&vec![0.0]));
    assert_eq!(tables.len(), 2);
    Ok(())
}

#[test]
fn test_write_order_rejected() -> TestResult {
    let dir = tempfile::tempdir()?;
    let root = FileSceneStore::create(dir.path().join("order.scc"))?;
    let a = root.create_child("a")?;
    a.write_object(&Data::Float(1.0), 1.0)?;

    let err = a.write_object(&Data::Float(0.0), 0.5).unwrap_err();
    assert!(matches!(err, Error::TimeOrder { previous, .. } if previous == 1.0));
    assert_eq!(err.kind(), ErrorKind::Usage);
    assert!(matches!(a.write_object(&Data::Float(0.0), 1.0), Err(Error::TimeOrder { .. })));

    // Independent properties keep independent clocks.
    a.write_attribute("user:x", &Data::Int(1), 0.0)?;
    a.write_transform(&Transform::identity(), 0.0)?;
    Ok(())
}

#[test]
fn test_non_finite_times_rejected() -> TestResult {
    let dir = tempfile::tempdir()?;
    let file = dir.path().join("nan.scc");
    {
        let root = FileSceneStore::create(&file)?;
        let a = root.create_child("a")?;
        a.write_object(&Data::Float(1.0), 1.0)?;
        assert!(matches!(a.write_object(&Data::Float(2.0), f64::NAN), Err(Error::NonFiniteTime { .. })));
        assert!(matches!(a.write_object(&Data::Float(0.0), 0.5), Err(Error::TimeOrder { .. })));
        assert!(a.write_bound(&BBox3d::new(DVec3::ZERO, DVec3::ONE), f64::INFINITY).is_err());
        assert!(a.write_attribute("user:x", &Data::Int(1), f64::NAN).is_err());
        assert!(!a.has_attribute("user:x"));
        assert!(a.write_transform(&Transform::identity(), f64::NEG_INFINITY).is_err());
    }

    let root = FileSceneStore::open(&file)?;
    let a = root.child("a", MissingBehaviour::ThrowIfMissing)?.ok_or("a")?;
    assert_eq!(a.num_object_samples(), 1);
    assert_eq!(a.object_sample_time(0)?, 1.0);
    assert!(!a.has_attribute("user:x"));
    assert!(!a.has_transform());
    Ok(())
}

#[test]
fn test_open_modes_are_exclusive() -> TestResult {
    let dir = tempfile::tempdir()?;
    let file = dir.path().join("modes.scc");
    {
        let root = FileSceneStore::create(&file)?;
        assert!(matches!(root.read_tags(TagFilter::LOCAL), Err(Error::WrongMode { .. })));
        assert!(matches!(root.hash(&HashType::Bound, 0.0, &mut MurmurHash::new()), Err(Error::WrongMode { .. })));
        root.create_child("a")?;
        assert!(matches!(root.create_child("a"), Err(Error::ChildExists { .. })));
    }

    let root = FileSceneStore::open(&file)?;
    assert!(!root.is_writable());
    assert!(matches!(root.write_object(&Data::Int(1), 0.0), Err(Error::WrongMode { .. })));
    assert!(matches!(root.create_child("b"), Err(Error::WrongMode { .. })));
    assert!(matches!(
        root.child("b", MissingBehaviour::CreateIfMissing),
        Err(Error::CreateInReadMode { .. })
    ));
    assert!(root.child("b", MissingBehaviour::NullIfMissing)?.is_none());
    assert!(matches!(
        root.child("b", MissingBehaviour::ThrowIfMissing),
        Err(Error::ChildNotFound { .. })
    ));
    Ok(())
}

#[test]
fn test_finalize_requires_closed_children() -> TestResult {
    let dir = tempfile::tempdir()?;
    let file = dir.path().join("open.scc");
    let root = FileSceneStore::create(&file)?;
    let child = root.create_child("a")?;
    child.write_object(&points(1.0), 0.0)?;

    assert!(matches!(root.finish(), Err(Error::ChildOpen { ref child, .. }) if child == "a"));
    child.finish()?;
    assert!(matches!(child.write_object(&points(2.0), 1.0), Err(Error::Finalized(_))));
    assert!(matches!(
        root.child("a", MissingBehaviour::NullIfMissing),
        Err(Error::Finalized(_))
    ));
    drop(child);
    root.finish()?;
    drop(root);

    let root = FileSceneStore::open(&file)?;
    assert_eq!(root.read_bound(0.0)?, BBox3d::new(DVec3::ZERO, DVec3::ONE));
    Ok(())
}

#[test]
fn test_sets_union_relative_paths() -> TestResult {
    let dir = tempfile::tempdir()?;
    let file = dir.path().join("sets.scc");
    {
        let root = FileSceneStore::create(&file)?;
        let a = root.create_child("a")?;
        let b = root.create_child("b")?;
        let c = b.create_child("c")?;

        let mut itself = PathSet::new();
        itself.add(Path::root());
        a.write_set("lights", &itself)?;
        c.write_set("lights", &itself)?;

        let mut below = PathSet::new();
        below.add(Path::parse("c"));
        b.write_set("cameras", &below)?;
    }

    let root = FileSceneStore::open(&file)?;
    assert_eq!(root.read_set("lights", true)?.to_strings(), vec!["/a", "/b/c"]);
    assert!(root.read_set("lights", false)?.is_empty());
    assert_eq!(root.set_names(true)?, vec!["cameras", "lights"]);
    assert!(root.set_names(false)?.is_empty());

    let b = root.child("b", MissingBehaviour::ThrowIfMissing)?.ok_or("b")?;
    assert_eq!(b.read_set("cameras", false)?.to_strings(), vec!["/c"]);
    assert_eq!(b.read_set("lights", true)?.to_strings(), vec!["/c"]);
    Ok(())
}

#[test]
fn test_hash_tracks_samples() -> TestResult {
    let dir = tempfile::tempdir()?;
    let file = dir.path().join("arm.scc");
    write_arm(&file)?;

    let root = FileSceneStore::open(&file)?;
    let arm = root.child("arm", MissingBehaviour::ThrowIfMissing)?.ok_or("arm")?;

    let hash = |loc: &LocationHandle, kind: HashType, t: f64| -> scenecache::Result<MurmurHash> {
        let mut h = MurmurHash::new();
        loc.hash(&kind, t, &mut h)?;
        Ok(h)
    };

    assert_ne!(hash(&arm, HashType::Object, 0.0)?, hash(&arm, HashType::Object, 1.0)?);
    assert_eq!(hash(&arm, HashType::Object, 1.0)?, hash(&arm, HashType::Object, 2.0)?);
    // Single-sample attribute: every time hashes the same.
    let speed = HashType::Attribute("user:speed".into());
    assert_eq!(hash(&arm, speed.clone(), 0.0)?, hash(&arm, speed, 7.0)?);
    assert_ne!(hash(&arm, HashType::Object, 0.0)?, hash(&arm, HashType::Bound, 0.0)?);

    let top: LocationHandle = root.clone();
    assert_eq!(hash(&top, HashType::Hierarchy, 0.5)?, hash(&top, HashType::Hierarchy, 0.5)?);
    assert_ne!(hash(&top, HashType::Hierarchy, 0.0)?, hash(&top, HashType::Hierarchy, 1.0)?);
    Ok(())
}

#[test]
fn test_buffered_reads_match_mmap() -> TestResult {
    let dir = tempfile::tempdir()?;
    let file = dir.path().join("arm.scc");
    write_arm(&file)?;

    let mapped = FileSceneStore::open(&file)?;
    let buffered = FileSceneStore::open_with_config(&file, SceneConfig::default().with_mmap(false))?;
    assert_eq!(mapped.read_bound(0.5)?, buffered.read_bound(0.5)?);
    assert_eq!(mapped.child_names()?, buffered.child_names()?);

    assert!(matches!(
        FileSceneStore::open(dir.path().join("absent.scc")),
        Err(Error::FileNotFound(_))
    ));
    Ok(())
}
