use std::fs;
use std::path::{Path, PathBuf};

use lux_core::ast::{Node, TimeDirective};
use lux_core::fixture::ChannelSpec;
use lux_core::{
    CueClock, CueEngine, FixtureDescriptor, JsonScriptParser, ParameterSpec, Show, ShowCommand,
    TimeKeyword, World,
};
use tempfile::TempDir;

fn write_script(path: &Path, name: &str, nodes: &[Node]) {
    let body = serde_json::to_string_pretty(nodes).unwrap();
    fs::write(path, format!("// name: {name}\n{body}\n")).unwrap();
}

fn level(value: f64) -> Node {
    Node::apply("intensity", vec![Node::number(value)])
}

fn on(id: f64, statements: Vec<Node>) -> Node {
    Node::selection(vec![Node::number(id)], statements)
}

struct Rig {
    _dir: TempDir,
    entry: PathBuf,
    cues: Vec<PathBuf>,
    show: Show,
}

/// Entry script loads `main`, which holds four cues:
/// 0 sets everything to 20, 1 brings fixture 1 to full, 2 fades fixture 2 to
/// full over 2s, 3 sets fixture 3 to 60.
fn rig() -> Rig {
    let dir = tempfile::tempdir().unwrap();
    let list = dir.path().join("cues").join("main");
    fs::create_dir_all(&list).unwrap();

    let entry = dir.path().join("show.json");
    write_script(&entry, "Entry", &[Node::Load("main".to_string())]);

    let scripts = vec![
        ("00-base.json", vec![level(20.0)]),
        ("01-front.json", vec![on(1.0, vec![level(100.0)])]),
        (
            "02-fade.json",
            vec![Node::time_block(
                vec![TimeDirective::new(TimeKeyword::Fade, 2.0)],
                vec![on(2.0, vec![level(100.0)])],
            )],
        ),
        ("03-back.json", vec![on(3.0, vec![level(60.0)])]),
    ];
    let cues = scripts
        .into_iter()
        .map(|(file, nodes)| {
            let path = list.join(file);
            write_script(&path, file, &nodes);
            fs::canonicalize(path).unwrap()
        })
        .collect();

    let dimmer = FixtureDescriptor {
        name: "Dimmer".to_string(),
        color_space: None,
        parameters: vec![ParameterSpec::Single(ChannelSpec::new("intensity"))],
    };
    let fixtures = (1..=3)
        .map(|id| dimmer.instantiate(id, 1, id as u16).unwrap())
        .collect();
    let show = Show::new(World::new(fixtures).unwrap(), JsonScriptParser)
        .with_cues(CueEngine::open(dir.path().join("cues")).unwrap())
        .with_clock(CueClock::manual());

    Rig {
        _dir: dir,
        entry,
        cues,
        show,
    }
}

fn levels(show: &mut Show, elapsed: f64) -> Vec<u8> {
    let universe = show.render_at(elapsed).universe(1).unwrap();
    (1..=3).map(|channel| universe.channel(channel).unwrap()).collect()
}

fn current_cue(show: &Show) -> usize {
    show.cues().unwrap().current().unwrap().current()
}

#[test]
fn entry_script_loads_the_first_cue() {
    let mut rig = rig();
    rig.show.start(&rig.entry).unwrap();

    assert_eq!(current_cue(&rig.show), 0);
    assert_eq!(levels(&mut rig.show, 0.0), vec![51, 51, 51]);
    let list = rig.show.cues().unwrap().current().unwrap();
    assert_eq!(list.current_cue().unwrap().label(), "00-base.json");
}

#[test]
fn goto_forward_fast_forwards_history_and_animates_the_target() {
    let mut rig = rig();
    rig.show.start(&rig.entry).unwrap();

    rig.show.command(ShowCommand::Goto(2)).unwrap();
    assert_eq!(current_cue(&rig.show), 2);
    assert_eq!(levels(&mut rig.show, 0.0), vec![255, 51, 51]);
    assert_eq!(levels(&mut rig.show, 1.0), vec![255, 153, 51]);
    assert_eq!(levels(&mut rig.show, 2.0), vec![255, 255, 51]);

    rig.show.command(ShowCommand::Go).unwrap();
    assert_eq!(levels(&mut rig.show, 0.0), vec![255, 255, 153]);
}

#[test]
fn goto_backward_rebuilds_from_the_top() {
    let mut rig = rig();
    rig.show.start(&rig.entry).unwrap();
    rig.show.command(ShowCommand::Goto(3)).unwrap();
    // Cue 2's fade was fast-forwarded on the way through.
    assert_eq!(levels(&mut rig.show, 0.0), vec![255, 255, 153]);
    assert_eq!(levels(&mut rig.show, 5.0), vec![255, 255, 153]);

    rig.show.command(ShowCommand::Goto(1)).unwrap();
    assert_eq!(current_cue(&rig.show), 1);
    assert_eq!(levels(&mut rig.show, 0.0), vec![255, 51, 51]);
}

#[test]
fn out_of_range_and_current_targets_are_no_ops() {
    let mut rig = rig();
    rig.show.start(&rig.entry).unwrap();

    rig.show.command(ShowCommand::Goto(9)).unwrap();
    rig.show.command(ShowCommand::Goto(0)).unwrap();
    assert_eq!(current_cue(&rig.show), 0);
    assert_eq!(levels(&mut rig.show, 0.0), vec![51, 51, 51]);
}

#[test]
fn go_wraps_back_to_the_first_cue() {
    let mut rig = rig();
    rig.show.start(&rig.entry).unwrap();
    for _ in 0..3 {
        rig.show.command(ShowCommand::Go).unwrap();
    }
    assert_eq!(current_cue(&rig.show), 3);

    rig.show.command(ShowCommand::Go).unwrap();
    assert_eq!(current_cue(&rig.show), 0);
    assert_eq!(levels(&mut rig.show, 0.0), vec![51, 51, 51]);
}

#[test]
fn editing_a_past_cue_replays_up_to_the_current_one() {
    let mut rig = rig();
    rig.show.start(&rig.entry).unwrap();
    rig.show.command(ShowCommand::Goto(1)).unwrap();

    write_script(&rig.cues[0], "00-base.json", &[level(40.0)]);
    rig.show.file_changed(&rig.cues[0]).unwrap();
    assert_eq!(current_cue(&rig.show), 1);
    assert_eq!(levels(&mut rig.show, 0.0), vec![255, 102, 102]);
}

#[test]
fn editing_a_future_cue_changes_nothing() {
    let mut rig = rig();
    rig.show.start(&rig.entry).unwrap();
    rig.show.command(ShowCommand::Goto(1)).unwrap();

    write_script(&rig.cues[3], "03-back.json", &[level(0.0)]);
    rig.show.file_changed(&rig.cues[3]).unwrap();
    assert_eq!(levels(&mut rig.show, 0.0), vec![255, 51, 51]);
}

#[test]
fn editing_the_entry_rebuilds_the_current_cue() {
    let mut rig = rig();
    rig.show.start(&rig.entry).unwrap();
    rig.show.command(ShowCommand::Goto(1)).unwrap();

    write_script(
        &rig.entry,
        "Entry",
        &[on(3.0, vec![level(80.0)]), Node::Load("main".to_string())],
    );
    rig.show.file_changed(&rig.entry).unwrap();

    // The entry's own load is skipped while replaying, so the list stays put.
    assert_eq!(current_cue(&rig.show), 1);
    assert_eq!(levels(&mut rig.show, 0.0), vec![255, 51, 51]);
    assert!(rig.show.dump_state().contains("Fixture 3 - Dimmer (1/3)"));
}

#[test]
fn a_broken_cue_keeps_the_last_good_state() {
    let mut rig = rig();
    rig.show.start(&rig.entry).unwrap();

    fs::write(&rig.cues[1], "[{\"Apply\": ").unwrap();
    assert!(rig.show.command(ShowCommand::Go).is_err());
    assert_eq!(levels(&mut rig.show, 0.0), vec![51, 51, 51]);
}
