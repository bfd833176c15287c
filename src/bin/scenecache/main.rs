//! Scenecache CLI - Tool for inspecting and linking scene cache files.

use std::env;
use std::path::Path as FsPath;

use anyhow::{bail, Context, Result};
use serde_json::json;
use tracing::{debug, info, trace};
use tracing_subscriber::EnvFilter;

use scenecache::core::{HashType, MurmurHash, TagFilter};
use scenecache::link::{LinkDescriptor, LinkScene};
use scenecache::scene::{FileSceneStore, Location, LocationHandle, MissingBehaviour};
use scenecache::util::Path;

fn main() {
    let args: Vec<String> = env::args().collect();

    // Parse global flags
    let mut level = "warn";
    let mut filtered_args: Vec<&str> = Vec::new();
    for arg in &args[1..] {
        match arg.as_str() {
            "-v" | "--verbose" => level = "debug",
            "-vv" | "--trace" => level = "trace",
            "-q" | "--quiet" => level = "off",
            _ => filtered_args.push(arg),
        }
    }
    init_tracing(level);

    if filtered_args.is_empty() {
        print_help();
        return;
    }

    let result = match filtered_args[0] {
        // Info command - show store summary
        "info" | "i" => {
            let json_mode = filtered_args.iter().any(|&s| s == "--json" || s == "-j");
            let files: Vec<&str> = filtered_args[1..].iter().copied().filter(|s| !s.starts_with('-')).collect();
            if files.is_empty() {
                missing_args("Error: missing file argument", "scenecache info <file.scc> [--json]");
            }
            cmd_info(files[0], json_mode)
        }

        // Tree command - show hierarchy
        "tree" | "t" => {
            let links = filtered_args.iter().any(|&s| s == "--links" || s == "-l");
            let files: Vec<&str> = filtered_args[1..].iter().copied().filter(|s| !s.starts_with('-')).collect();
            if files.is_empty() {
                missing_args("Error: missing file argument", "scenecache tree <file.scc> [--links]");
            }
            cmd_tree(files[0], links)
        }

        // Hash command - content hash of one location
        "hash" => {
            if filtered_args.len() < 2 {
                missing_args("Error: missing file argument", "scenecache hash <file.scc> [path] [time] [kind]");
            }
            let path = filtered_args.get(2).copied().unwrap_or("/");
            let time = filtered_args.get(3).copied().unwrap_or("0");
            let kind = filtered_args.get(4).copied().unwrap_or("hierarchy");
            cmd_hash(filtered_args[1], path, time, kind)
        }

        // Link command - write a file that mounts another one
        "link" | "l" => {
            if filtered_args.len() < 4 {
                missing_args(
                    "Error: missing arguments",
                    "scenecache link <out.scc> <location> <target.scc> [target_root]",
                );
            }
            let root = filtered_args.get(4).copied().unwrap_or("/");
            cmd_link(filtered_args[1], filtered_args[2], filtered_args[3], root)
        }

        "version" | "--version" => {
            println!(
                "scenecache {} (built {} {})",
                env!("CARGO_PKG_VERSION"),
                env!("SCENECACHE_BUILD_DATE"),
                env!("SCENECACHE_BUILD_TIME")
            );
            Ok(())
        }

        // Help
        "help" | "h" | "-h" | "--help" => {
            print_help();
            Ok(())
        }

        // Default: if file exists, show info; otherwise error
        _ => {
            if FsPath::new(filtered_args[0]).exists() {
                cmd_info(filtered_args[0], false)
            } else {
                eprintln!("Unknown command: {}", filtered_args[0]);
                eprintln!();
                print_help();
                std::process::exit(1);
            }
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_env("SCENECACHE_LOG").unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn missing_args(msg: &str, usage: &str) -> ! {
    eprintln!("{}", msg);
    eprintln!("Usage: {}", usage);
    std::process::exit(1);
}

fn print_help() {
    println!("scenecache - scene cache toolkit");
    println!();
    println!("USAGE:");
    println!("    scenecache [OPTIONS] <COMMAND> [ARGS]");
    println!();
    println!("COMMANDS:");
    println!("    i, info   <file> [--json]             Show store summary");
    println!("    t, tree   <file> [--links]            Show location hierarchy");
    println!("    hash      <file> [path] [time] [kind] Content hash of a location");
    println!("    l, link   <out> <loc> <target> [root] Write a file linking <target> at <loc>");
    println!("    version                             Show version and build date");
    println!("    h, help                             Show this help");
    println!();
    println!("OPTIONS:");
    println!("    -v, --verbose    Show debug output");
    println!("    -vv, --trace     Show trace output (very verbose)");
    println!("    -q, --quiet      Suppress all log output");
    println!();
    println!("EXAMPLES:");
    println!("    scenecache info shot.scc                   # Quick overview");
    println!("    scenecache tree shot.scc --links           # Hierarchy with linked content");
    println!("    scenecache hash shot.scc /robot 1.5 bound  # Bound hash at time 1.5");
    println!("    scenecache link shot.scc /robot robot.scc  # Mount robot.scc at /robot");
    println!();
    println!("NOTES:");
    println!("    - Passing a file directly is equivalent to 'info'");
    println!("    - Hash kinds: hierarchy, bound, transform, object, childNames, attribute:<name>");
    println!("    - SCENECACHE_LOG overrides the log filter (e.g. SCENECACHE_LOG=scenecache=trace)");
}

#[derive(Default)]
struct Counts {
    locations: usize,
    objects: usize,
    transforms: usize,
    links: usize,
    max_depth: usize,
}

fn count_locations(loc: &dyn Location, depth: usize, counts: &mut Counts) -> Result<()> {
    counts.locations += 1;
    counts.max_depth = counts.max_depth.max(depth);
    if loc.has_object() {
        counts.objects += 1;
    }
    if loc.has_transform() {
        counts.transforms += 1;
    }
    if loc.has_attribute(scenecache::link::LINK_ATTRIBUTE) {
        counts.links += 1;
    }
    for name in loc.child_names()? {
        if let Some(child) = loc.child(&name, MissingBehaviour::ThrowIfMissing)? {
            count_locations(child.as_ref(), depth + 1, counts)?;
        }
    }
    Ok(())
}

fn cmd_info(path: &str, json_mode: bool) -> Result<()> {
    info!("Opening store: {}", path);
    let store = FileSceneStore::open(path).with_context(|| format!("failed to open {}", path))?;
    debug!("Store opened successfully");

    let tables = store.sample_time_tables()?;
    let mut counts = Counts::default();
    count_locations(&*store, 0, &mut counts)?;
    let bound = if store.has_bound() {
        Some(store.read_bound_at_sample(0)?)
    } else {
        None
    };
    let tags = store.read_tags(TagFilter::LOCAL | TagFilter::DESCENDANT)?;
    let sets = store.set_names(true)?;
    debug!("Counted {} locations", counts.locations);

    if json_mode {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "file": path,
                "timeTables": tables,
                "locations": counts.locations,
                "objects": counts.objects,
                "transforms": counts.transforms,
                "links": counts.links,
                "depth": counts.max_depth,
                "bound": bound.map(|b| json!({
                    "min": b.min.to_array(),
                    "max": b.max.to_array(),
                })),
                "tags": tags,
                "sets": sets,
            }))
            .unwrap_or_default()
        );
        return Ok(());
    }

    println!("Store: {}", path);
    println!("Time tables: {}", tables.len());
    for (i, t) in tables.iter().enumerate() {
        match (t.first(), t.last()) {
            (Some(first), Some(last)) => println!("  [{}] {} samples, {} .. {}", i, t.len(), first, last),
            _ => println!("  [{}] empty", i),
        }
    }
    println!();
    println!("Locations:  {} (depth {})", counts.locations, counts.max_depth);
    println!("  Objects:    {}", counts.objects);
    println!("  Transforms: {}", counts.transforms);
    println!("  Links:      {}", counts.links);
    if let Some(b) = bound {
        println!();
        println!("Bound: {:?} .. {:?}", b.min.to_array(), b.max.to_array());
    }
    if !tags.is_empty() {
        println!("Tags: {}", tags.join(", "));
    }
    if !sets.is_empty() {
        println!("Sets: {}", sets.join(", "));
    }
    Ok(())
}

fn cmd_tree(path: &str, links: bool) -> Result<()> {
    info!("Opening store: {}", path);
    let root: LocationHandle = if links {
        LinkScene::open(path).with_context(|| format!("failed to open {}", path))? as LocationHandle
    } else {
        FileSceneStore::open(path).with_context(|| format!("failed to open {}", path))? as LocationHandle
    };

    println!("Store: {}", path);
    println!();
    print_tree(root.as_ref(), 0)
}

fn print_tree(loc: &dyn Location, depth: usize) -> Result<()> {
    let indent = "  ".repeat(depth);
    let mut notes = Vec::new();
    if loc.has_transform() {
        notes.push("xform".to_string());
    }
    if loc.has_object() {
        notes.push(format!("object x{}", loc.num_object_samples()));
    }
    if loc.has_attribute(scenecache::link::LINK_ATTRIBUTE) {
        notes.push("link".to_string());
    }
    let tags = loc.read_tags(TagFilter::LOCAL)?;
    if !tags.is_empty() {
        notes.push(format!("tags: {}", tags.join(",")));
    }
    let name = if loc.path().is_root() { "/" } else { loc.name() };
    if notes.is_empty() {
        println!("{}{}", indent, name);
    } else {
        println!("{}{} [{}]", indent, name, notes.join("; "));
    }

    for child_name in loc.child_names()? {
        trace!("Descending into {}", child_name);
        match loc.child(&child_name, MissingBehaviour::NullIfMissing)? {
            Some(child) => print_tree(child.as_ref(), depth + 1)?,
            None => println!("{}  {} [unavailable]", indent, child_name),
        }
    }
    Ok(())
}

fn parse_hash_kind(kind: &str) -> Result<HashType> {
    Ok(match kind {
        "hierarchy" => HashType::Hierarchy,
        "bound" => HashType::Bound,
        "transform" => HashType::Transform,
        "object" => HashType::Object,
        "childNames" | "children" => HashType::ChildNames,
        other => match other.strip_prefix("attribute:") {
            Some(name) => HashType::Attribute(name.to_string()),
            None => bail!("unknown hash kind '{}'", other),
        },
    })
}

fn cmd_hash(file: &str, path: &str, time: &str, kind: &str) -> Result<()> {
    let time: f64 = time.parse().with_context(|| format!("invalid time '{}'", time))?;
    let kind = parse_hash_kind(kind)?;
    let scene = LinkScene::open(file).with_context(|| format!("failed to open {}", file))?;
    let loc = scene
        .scene(&Path::parse(path), MissingBehaviour::ThrowIfMissing)?
        .with_context(|| format!("no location {}", path))?;

    let mut h = MurmurHash::new();
    loc.hash(&kind, time, &mut h)?;
    println!("{}", h);
    Ok(())
}

fn cmd_link(out: &str, location: &str, target: &str, root: &str) -> Result<()> {
    info!("Writing {} with {} mounted at {}", out, target, location);
    let location = Path::parse(location);
    if location.is_root() {
        bail!("cannot link at the root location");
    }
    let scene = LinkScene::create(out).with_context(|| format!("failed to create {}", out))?;

    let mut chain = vec![scene];
    for name in location.names() {
        let parent = chain.last().context("empty location chain")?;
        let child = parent.create_scene(name)?;
        chain.push(child);
    }
    let desc = LinkDescriptor::new(target, Path::parse(root));
    let mount = chain.last().context("empty location chain")?;
    mount.write_link(&desc, 0.0)?;
    debug!("Linked {} at {}", target, mount.path());

    // Innermost first, so every parent sees its children finalized.
    while let Some(loc) = chain.pop() {
        loc.finish()?;
    }
    println!("Wrote {}", out);
    Ok(())
}
