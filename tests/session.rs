// Host session over in-memory links, running on real time.
use krusty_engraver::communication::{run_session, AsyncSink, AsyncSource};
use krusty_engraver::hardware::{MonotonicClock, SimulatedBoard};
use krusty_engraver::{Config, Machine};
use tokio_test::assert_ok;

fn machine() -> Machine<SimulatedBoard, MonotonicClock> {
    Machine::new(Config::default(), SimulatedBoard::new(), MonotonicClock::new())
}

#[tokio::test]
async fn test_session_runs_program_to_completion() {
    let mut machine = machine();
    let mut output: Vec<u8> = Vec::new();

    let result = run_session(
        &mut machine,
        AsyncSource(&b"G1 X1 F6000\nG0 X0\n?"[..]),
        AsyncSink(&mut output),
    )
    .await;
    assert_ok!(result);

    let text = String::from_utf8_lossy(&output);
    assert_eq!(text.matches("ok\r\n").count(), 2);
    assert!(text.contains("$ Status: "));
    assert_eq!(machine.state().position, [0, 0, 0]);
    assert_eq!(machine.board().total_pulses(), 160);
}

#[tokio::test]
async fn test_session_terminates_unfinished_last_line() {
    let mut machine = machine();
    let mut output: Vec<u8> = Vec::new();

    assert_ok!(run_session(&mut machine, AsyncSource(&b"G0 X0.5"[..]), AsyncSink(&mut output)).await);
    assert_eq!(machine.state().position, [40, 0, 0]);
    assert_eq!(output, b"ok\r\n");
}

#[tokio::test]
async fn test_session_holds_input_behind_long_move() {
    let mut program = String::from("G1 X2 F6000\n");
    for y in 1..=40 {
        program.push_str(&format!("Y{}\n", y));
    }

    let mut machine = machine();
    let mut output: Vec<u8> = Vec::new();
    let source = AsyncSource(std::io::Cursor::new(program.into_bytes()));
    assert_ok!(run_session(&mut machine, source, AsyncSink(&mut output)).await);

    let text = String::from_utf8_lossy(&output);
    assert!(!text.contains("error"), "{}", text);
    assert_eq!(text.matches("ok\r\n").count(), 41);
    assert_eq!(machine.state().position, [160, 3200, 0]);
    assert_eq!(machine.board().position(), [160, 3200, 0]);
}

#[tokio::test]
async fn test_session_ends_when_link_closes_while_paused() {
    let mut machine = machine();
    let mut output: Vec<u8> = Vec::new();

    assert_ok!(run_session(&mut machine, AsyncSource(&b"M0\nX1\n"[..]), AsyncSink(&mut output)).await);
    assert!(machine.state().pause == krusty_engraver::PauseState::Paused);
    assert_eq!(machine.state().position, [0, 0, 0]);
}
