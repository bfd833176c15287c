//! Linked scenes read and written through `LinkScene`.

use std::path::Path as FsPath;

use scenecache::link::LINK_ATTRIBUTE;
use scenecache::prelude::*;
use scenecache::util::{DMat4, DVec3};

type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

fn points(max: f64) -> Data {
    Data::V3dArray(vec![DVec3::ZERO, DVec3::splat(max)])
}

/// `b.scc`: root tagged `hero`; `/leg` with points sampled at 0, 5 and 10,
/// tagged and in a set.
fn write_linked(dir: &FsPath) -> scenecache::Result<()> {
    let root = FileSceneStore::create(dir.join("b.scc"))?;
    root.write_tags(&["hero".to_string()])?;
    let leg = root.create_child("leg")?;
    for (t, max) in [(0.0, 1.0), (5.0, 2.0), (10.0, 3.0)] {
        leg.write_object(&points(max), t)?;
    }
    leg.write_tags(&["visible".to_string()])?;
    let mut itself = PathSet::new();
    itself.add(Path::root());
    leg.write_set("lights", &itself)?;
    Ok(())
}

/// `main.scc`: `/robot` links all of `b.scc` with a time remap
/// (5 -> 0, 10 -> 5); `/static` links `b.scc:/leg` without one.
fn write_main(dir: &FsPath) -> scenecache::Result<()> {
    let scene = LinkScene::create(dir.join("main.scc"))?;
    let robot = scene.create_scene("robot")?;
    robot.write_transform(&Transform::from_translation(DVec3::new(10.0, 0.0, 0.0)), 0.0)?;
    let link = LinkDescriptor::new("b.scc", Path::root());
    robot.write_link(&link.clone().with_time(0.0), 5.0)?;
    robot.write_link(&link.with_time(5.0), 10.0)?;

    let fixed = scene.create_scene("static")?;
    fixed.write_link(&LinkDescriptor::new("b.scc", Path::parse("/leg")), 0.0)?;
    Ok(())
}

fn setup() -> std::result::Result<tempfile::TempDir, Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    write_linked(dir.path())?;
    write_main(dir.path())?;
    Ok(dir)
}

#[test]
fn test_paths_concatenate_across_links() -> TestResult {
    let dir = setup()?;
    let scene = LinkScene::open(dir.path().join("main.scc"))?;

    let mut names = scene.child_names()?;
    names.sort();
    assert_eq!(names, vec!["robot", "static"]);

    let robot = scene.child_scene("robot", MissingBehaviour::ThrowIfMissing)?.ok_or("robot")?;
    assert!(robot.is_link_boundary());
    assert!(!robot.is_linked());
    assert_eq!(robot.child_names()?, vec!["leg"]);

    let leg = scene.scene(&Path::parse("/robot/leg"), MissingBehaviour::ThrowIfMissing)?.ok_or("leg")?;
    assert_eq!(leg.path().to_string(), "/robot/leg");
    assert_eq!(leg.name(), "leg");
    assert!(leg.file_name().ends_with("main.scc"));

    // The boundary keeps its own transform.
    assert_eq!(
        robot.read_transform_as_matrix(0.0)?,
        DMat4::from_translation(DVec3::new(10.0, 0.0, 0.0))
    );
    assert!(robot.has_attribute(LINK_ATTRIBUTE));
    Ok(())
}

#[test]
fn test_time_remap() -> TestResult {
    let dir = setup()?;
    let scene = LinkScene::open(dir.path().join("main.scc"))?;
    let leg = scene.scene(&Path::parse("/robot/leg"), MissingBehaviour::ThrowIfMissing)?.ok_or("leg")?;

    assert_eq!(leg.read_object(5.0)?, points(1.0));
    assert_eq!(leg.read_object(10.0)?, points(2.0));
    // Remap times interpolate between descriptor samples: 7.5 -> 2.5.
    assert_eq!(leg.read_object(7.5)?, points(1.5));

    let robot = scene.child_scene("robot", MissingBehaviour::ThrowIfMissing)?.ok_or("robot")?;
    assert_eq!(robot.read_link(7.5)?.and_then(|l| l.time), Some(2.5));
    assert_eq!(robot.read_bound(5.0)?, BBox3d::new(DVec3::ZERO, DVec3::ONE));

    // Without remap times the overlay time passes through.
    let fixed = scene.child_scene("static", MissingBehaviour::ThrowIfMissing)?.ok_or("static")?;
    assert_eq!(fixed.read_object(5.0)?, points(2.0));
    assert!(fixed.child_names()?.is_empty());
    assert_eq!(fixed.num_bound_samples(), 3);
    Ok(())
}

#[test]
fn test_tags_cross_link_boundaries() -> TestResult {
    let dir = setup()?;
    let scene = LinkScene::open(dir.path().join("main.scc"))?;
    let robot = scene.child_scene("robot", MissingBehaviour::ThrowIfMissing)?.ok_or("robot")?;

    // The linked root's own tags sit below the boundary.
    assert!(robot.has_tag("hero", TagFilter::DESCENDANT)?);
    assert!(robot.has_tag("visible", TagFilter::DESCENDANT)?);
    assert!(robot.has_tag("hero", TagFilter::LOCAL)?);
    assert!(scene.has_tag("hero", TagFilter::DESCENDANT)?);
    assert!(scene.has_tag("visible", TagFilter::DESCENDANT)?);

    let leg = robot.child("leg", MissingBehaviour::ThrowIfMissing)?.ok_or("leg")?;
    assert_eq!(leg.read_tags(TagFilter::LOCAL)?, vec!["visible"]);
    assert!(leg.read_tags(TagFilter::DESCENDANT)?.is_empty());
    assert_eq!(leg.read_tags(TagFilter::ANCESTOR)?, vec!["hero", "visible"]);
    Ok(())
}

#[test]
fn test_sets_union_through_links() -> TestResult {
    let dir = setup()?;
    let scene = LinkScene::open(dir.path().join("main.scc"))?;
    assert_eq!(
        scene.read_set("lights", true)?.to_strings(),
        vec!["/robot/leg", "/static"]
    );
    assert_eq!(scene.set_names(true)?, vec!["lights"]);
    Ok(())
}

#[test]
fn test_link_cache_shared_across_threads() -> TestResult {
    let dir = setup()?;
    let scene = LinkScene::open(dir.path().join("main.scc"))?;

    std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let scene = &scene;
                s.spawn(move || -> scenecache::Result<Data> {
                    let path = if i % 2 == 0 { "/robot/leg" } else { "/static" };
                    let loc = scene
                        .scene(&Path::parse(path), MissingBehaviour::ThrowIfMissing)?
                        .ok_or_else(|| Error::invalid("location missing"))?;
                    loc.read_object(10.0)
                })
            })
            .collect();
        for h in handles {
            assert!(h.join().expect("reader thread").is_ok());
        }
    });

    assert_eq!(scene.link_cache().len(), 1);
    assert_eq!(scene.link_cache().file_names(), vec!["b.scc"]);

    let mut a = MurmurHash::new();
    let mut b = MurmurHash::new();
    scene.hash(&HashType::Hierarchy, 5.0, &mut a)?;
    scene.hash(&HashType::Hierarchy, 5.0, &mut b)?;
    assert_eq!(a, b);
    Ok(())
}

#[test]
fn test_dangling_link() -> TestResult {
    let dir = setup()?;
    std::fs::remove_file(dir.path().join("b.scc"))?;

    let scene = LinkScene::open(dir.path().join("main.scc"))?;
    let robot = scene.child_scene("robot", MissingBehaviour::ThrowIfMissing)?.ok_or("robot")?;

    // Probes report nothing; reads report the missing target.
    assert!(robot.child_names()?.is_empty());
    assert!(!robot.has_child("leg"));
    assert!(!robot.has_object());
    assert!(!robot.has_bound());
    assert!(matches!(robot.read_bound(5.0), Err(Error::LinkTargetNotFound(_))));
    assert!(robot.child("leg", MissingBehaviour::NullIfMissing).is_err());

    // Main-scene data at the boundary is still there.
    assert!(robot.has_transform());
    assert_eq!(robot.read_link(5.0)?.map(|l| l.file_name), Some("b.scc".to_string()));
    Ok(())
}

#[test]
fn test_link_targets_checked_on_write() -> TestResult {
    let dir = tempfile::tempdir()?;
    write_linked(dir.path())?;

    let scene = LinkScene::create(dir.path().join("main.scc"))?;
    let a = scene.create_scene("a")?;
    assert!(matches!(
        a.write_link(&LinkDescriptor::new("nowhere.scc", Path::root()), 0.0),
        Err(Error::LinkTargetNotFound(_))
    ));
    assert!(matches!(
        a.write_link(&LinkDescriptor::new("b.scc", Path::parse("/arm")), 0.0),
        Err(Error::LinkRootNotFound { .. })
    ));
    assert!(!a.has_attribute(LINK_ATTRIBUTE));
    Ok(())
}

#[test]
fn test_composited_writes_rejected() -> TestResult {
    let dir = tempfile::tempdir()?;
    write_linked(dir.path())?;
    {
        let scene = LinkScene::create(dir.path().join("main.scc"))?;
        let robot = scene.create_scene("robot")?;
        robot.write_link(&LinkDescriptor::new("b.scc", Path::root()), 0.0)?;
        assert!(matches!(robot.create_child("arm"), Err(Error::CompositedWrite(_))));
        assert!(matches!(robot.write_object(&Data::Int(1), 1.0), Err(Error::CompositedWrite(_))));
        assert!(matches!(
            robot.child("arm", MissingBehaviour::CreateIfMissing),
            Err(Error::CompositedWrite(_))
        ));
        // The boundary's own transform is not linked content.
        robot.write_transform(&Transform::identity(), 0.0)?;

        let parent = scene.create_scene("parent")?;
        parent.create_scene("kid")?;
        assert!(matches!(
            parent.write_link(&LinkDescriptor::new("b.scc", Path::root()), 0.0),
            Err(Error::CompositedWrite(_))
        ));
    }

    let scene = LinkScene::open(dir.path().join("main.scc"))?;
    assert!(matches!(
        scene.write_bound(&BBox3d::new(DVec3::ZERO, DVec3::ONE), 0.0),
        Err(Error::WrongMode { .. })
    ));
    let leg = scene.scene(&Path::parse("/robot/leg"), MissingBehaviour::ThrowIfMissing)?.ok_or("leg")?;
    assert!(matches!(
        leg.write_transform(&Transform::identity(), 0.0),
        Err(Error::CompositedWrite(_))
    ));
    assert!(matches!(
        scene.child("new", MissingBehaviour::CreateIfMissing),
        Err(Error::CreateInReadMode { .. })
    ));
    Ok(())
}

#[test]
fn test_link_written_as_attribute() -> TestResult {
    let dir = tempfile::tempdir()?;
    write_linked(dir.path())?;
    let file = dir.path().join("main.scc");
    {
        let scene = LinkScene::create(&file)?;
        let robot = scene.create_scene("robot")?;
        assert!(matches!(
            robot.write_attribute(LINK_ATTRIBUTE, &Data::Int(1), 0.0),
            Err(Error::MalformedLink { .. })
        ));
        assert!(!robot.has_attribute(LINK_ATTRIBUTE));
        robot.write_attribute(LINK_ATTRIBUTE, &LinkDescriptor::new("b.scc", Path::root()).to_data(), 0.0)?;
    }

    // The plain store sees what a link write records: tags and bound.
    let store = FileSceneStore::open(&file)?;
    let robot = store.child("robot", MissingBehaviour::ThrowIfMissing)?.ok_or("robot")?;
    assert!(robot.has_tag("visible", TagFilter::LOCAL)?);
    assert!(store.has_tag("visible", TagFilter::DESCENDANT)?);
    assert!(store.has_tag("hero", TagFilter::DESCENDANT)?);
    assert!(robot.has_bound());
    assert_eq!(robot.num_bound_samples(), 3);
    Ok(())
}

#[test]
fn test_failed_link_write_leaves_no_sample() -> TestResult {
    let dir = tempfile::tempdir()?;
    write_linked(dir.path())?;

    let scene = LinkScene::create(dir.path().join("main.scc"))?;
    let robot = scene.create_scene("robot")?;
    let link = LinkDescriptor::new("b.scc", Path::root());
    // Mirrors the linked bound at 0, 5 and 10.
    robot.write_link(&link, 0.0)?;
    assert_eq!(robot.num_bound_samples(), 3);

    let err = robot.write_link(&link.with_time(2.0), 1.0).unwrap_err();
    assert!(matches!(err, Error::TimeOrder { ref property, previous, .. } if property == "bound" && previous == 10.0));
    assert_eq!(robot.num_attribute_samples(LINK_ATTRIBUTE), 1);
    assert_eq!(robot.num_bound_samples(), 3);
    Ok(())
}

#[test]
fn test_nested_links_remap_at_every_depth() -> TestResult {
    let dir = tempfile::tempdir()?;
    {
        // inner.scc: /leaf sampled as 100 * t.
        let inner = FileSceneStore::create(dir.path().join("inner.scc"))?;
        let leaf = inner.create_child("leaf")?;
        leaf.write_object(&Data::Float(0.0), 0.0)?;
        leaf.write_object(&Data::Float(1000.0), 10.0)?;
    }
    {
        // middle.scc: /mid plays inner.scc at half speed.
        let middle = LinkScene::create(dir.path().join("middle.scc"))?;
        let mid = middle.create_scene("mid")?;
        let link = LinkDescriptor::new("inner.scc", Path::root());
        mid.write_link(&link.clone().with_time(0.0), 0.0)?;
        mid.write_link(&link.with_time(5.0), 10.0)?;
    }
    {
        // main.scc: /top plays middle.scc ten times faster.
        let main = LinkScene::create(dir.path().join("main.scc"))?;
        let top = main.create_scene("top")?;
        let link = LinkDescriptor::new("middle.scc", Path::root());
        top.write_link(&link.clone().with_time(0.0), 0.0)?;
        top.write_link(&link.with_time(10.0), 1.0)?;
    }

    let scene = LinkScene::open(dir.path().join("main.scc"))?;
    let leaf = scene
        .scene(&Path::parse("/top/mid/leaf"), MissingBehaviour::ThrowIfMissing)?
        .ok_or("leaf")?;
    assert_eq!(leaf.path().to_string(), "/top/mid/leaf");
    // main 0.5 -> middle 5 -> inner 2.5
    assert_eq!(leaf.read_object(0.5)?, Data::Float(250.0));
    // main 1 -> middle 10 -> inner 5
    assert_eq!(leaf.read_object(1.0)?, Data::Float(500.0));
    assert_eq!(leaf.read_object(0.0)?, Data::Float(0.0));
    assert_eq!(scene.link_cache().len(), 2);
    Ok(())
}
