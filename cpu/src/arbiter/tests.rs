use test_strategy::{proptest, Arbitrary};

use super::*;

fn regs(ids: &[usize]) -> Vec<RegisterRef> {
    ids.iter().map(|id| RegisterRef::new(0, *id)).collect()
}

fn files(count: usize) -> Vec<RegisterFile> {
    vec![RegisterFile::new("x", count, None)]
}

fn locked(files: &[RegisterFile]) -> Vec<usize> {
    (0..files[0].len())
        .filter(|id| files[0].is_locked(*id))
        .collect()
}

#[test]
fn test_single_request() {
    let mut files = files(32);
    let mut arbiter = Arbiter::new();
    let a = arbiter.submit(&mut files, &regs(&[1, 2, 1, 6]));
    assert!(arbiter.is_ready(a));
    assert_eq!(locked(&files), vec![1, 2, 6]);
    assert_eq!(arbiter.waiting_len(), 0);

    arbiter.release(&mut files, a);
    assert!(!arbiter.is_ready(a));
    assert!(locked(&files).is_empty());
}

#[test]
fn test_fully_intersecting_requests() {
    let mut files = files(32);
    let mut arbiter = Arbiter::new();
    let a1 = arbiter.submit(&mut files, &regs(&[1, 2, 1, 6]));
    let a2 = arbiter.submit(&mut files, &regs(&[1, 2, 1, 6]));
    assert!(arbiter.is_ready(a1));
    assert!(!arbiter.is_ready(a2));
    assert!(arbiter
        .handle_states(a2)
        .iter()
        .all(|s| !s.borrowed && !s.acquired));

    arbiter.release(&mut files, a1);
    assert!(!arbiter.is_ready(a1));
    assert!(arbiter.is_ready(a2));
    // Ownership moved directly; the registers never became free.
    assert_eq!(locked(&files), vec![1, 2, 6]);

    arbiter.release(&mut files, a2);
    assert!(locked(&files).is_empty());
    assert_eq!(arbiter.waiting_len(), 0);
}

/// ```text
/// |  | 1 2 3 4 5 6 7 8 9
/// |a | x x       x
/// |b |   x       x x
/// |c |     x x         x
/// |d1| x           x x x
/// |d2| x           x x x
/// ```
#[test]
fn test_partially_intersecting_requests() {
    let mut files = files(32);
    let mut arbiter = Arbiter::new();
    let a = arbiter.submit(&mut files, &regs(&[1, 2, 1, 6]));
    let b = arbiter.submit(&mut files, &regs(&[2, 6, 7]));
    let c = arbiter.submit(&mut files, &regs(&[3, 9, 3, 4]));
    let d1 = arbiter.submit(&mut files, &regs(&[1, 8, 7, 9]));
    let d2 = arbiter.submit(&mut files, &regs(&[1, 8, 7, 9]));
    let ready = |arbiter: &Arbiter| {
        [a, b, c, d1, d2]
            .iter()
            .map(|t| arbiter.is_ready(*t))
            .collect::<Vec<bool>>()
    };

    assert_eq!(ready(&arbiter), vec![true, false, true, false, false]);
    assert_eq!(locked(&files), vec![1, 2, 3, 4, 6, 7, 8, 9]);

    arbiter.release(&mut files, a);
    assert_eq!(ready(&arbiter), vec![false, true, true, false, false]);
    assert_eq!(locked(&files), vec![1, 2, 3, 4, 6, 7, 8, 9]);

    arbiter.release(&mut files, c);
    assert_eq!(ready(&arbiter), vec![false, true, false, false, false]);
    assert_eq!(locked(&files), vec![1, 2, 6, 7, 8, 9]);

    arbiter.release(&mut files, b);
    assert_eq!(ready(&arbiter), vec![false, false, false, true, false]);
    assert_eq!(locked(&files), vec![1, 7, 8, 9]);

    arbiter.release(&mut files, d1);
    assert_eq!(ready(&arbiter), vec![false, false, false, false, true]);
    assert_eq!(locked(&files), vec![1, 7, 8, 9]);

    arbiter.release(&mut files, d2);
    assert_eq!(ready(&arbiter), vec![false; 5]);
    assert!(locked(&files).is_empty());
}

#[test]
fn test_fifo_bias() {
    let mut files = files(8);
    let mut arbiter = Arbiter::new();
    let r1 = arbiter.submit(&mut files, &regs(&[1, 2]));
    let r2 = arbiter.submit(&mut files, &regs(&[2, 3]));
    assert!(arbiter.is_ready(r1));
    assert!(!arbiter.is_ready(r2));
    // r2 already holds register 3 while it waits for 2.
    assert!(arbiter.holds(r2, RegisterRef::new(0, 3)));

    arbiter.release(&mut files, r1);
    assert!(arbiter.is_ready(r2));
    assert_eq!(locked(&files), vec![2, 3]);
}

#[test]
fn test_earlier_waiter_wins() {
    let mut files = files(8);
    let mut arbiter = Arbiter::new();
    let holder = arbiter.submit(&mut files, &regs(&[4]));
    let first = arbiter.submit(&mut files, &regs(&[4, 5]));
    let second = arbiter.submit(&mut files, &regs(&[4]));
    arbiter.release(&mut files, holder);
    assert!(arbiter.is_ready(first));
    assert!(!arbiter.is_ready(second));
    arbiter.release(&mut files, first);
    assert!(arbiter.is_ready(second));
}

#[test]
fn test_zero_register_never_blocks() {
    let mut files = vec![RegisterFile::new("x", 8, Some(0))];
    let mut arbiter = Arbiter::new();
    let a = arbiter.submit(&mut files, &regs(&[0, 1]));
    let b = arbiter.submit(&mut files, &regs(&[0, 2]));
    assert!(arbiter.is_ready(a));
    assert!(arbiter.is_ready(b));
    assert!(!files[0].is_locked(0));
    arbiter.release(&mut files, a);
    assert!(arbiter.is_ready(b));
    assert_eq!(locked(&files), vec![2]);
}

#[test]
fn test_releasing_a_waiting_request_leaves_the_queue() {
    let mut files = files(8);
    let mut arbiter = Arbiter::new();
    let a = arbiter.submit(&mut files, &regs(&[1]));
    let b = arbiter.submit(&mut files, &regs(&[1, 2]));
    assert_eq!(arbiter.waiting_len(), 1);
    arbiter.release(&mut files, b);
    assert_eq!(arbiter.waiting_len(), 0);
    // b gave back register 2 which it held, but not register 1 which
    // belongs to a.
    assert_eq!(locked(&files), vec![1]);
    assert!(arbiter.is_ready(a));
}

#[test]
fn test_registers_in_different_files_are_distinct() {
    let mut files = vec![
        RegisterFile::new("x", 4, None),
        RegisterFile::new("f", 4, None),
    ];
    let mut arbiter = Arbiter::new();
    let a = arbiter.submit(&mut files, &[RegisterRef::new(0, 1)]);
    let b = arbiter.submit(&mut files, &[RegisterRef::new(1, 1)]);
    assert!(arbiter.is_ready(a));
    assert!(arbiter.is_ready(b));
}

#[derive(Debug, Arbitrary)]
struct Workload {
    #[strategy(proptest::collection::vec(proptest::collection::vec(0..6usize, 1..4), 1..16))]
    requests: Vec<Vec<usize>>,
    /// How many ready requests to release after each submission.
    #[strategy(proptest::collection::vec(0..3usize, #requests.len()))]
    releases: Vec<usize>,
}

/// Every register is held by at most one live request, and is locked
/// in the file exactly when some live request holds it.
fn check_invariants(arbiter: &Arbiter, files: &[RegisterFile], live: &[Ticket]) {
    for id in 0..files[0].len() {
        let reg = RegisterRef::new(0, id);
        let holders = live.iter().filter(|t| arbiter.holds(**t, reg)).count();
        assert!(holders <= 1, "register {reg} held by {holders} requests");
        assert_eq!(files[0].is_locked(id), holders == 1, "lock state of {reg}");
    }
}

fn release_ready(
    arbiter: &mut Arbiter,
    files: &mut [RegisterFile],
    live: &mut Vec<Ticket>,
    limit: usize,
) -> usize {
    let mut released = 0;
    while released < limit {
        let Some(pos) = live.iter().position(|t| arbiter.is_ready(*t)) else {
            break;
        };
        let ticket = live.remove(pos);
        arbiter.release(files, ticket);
        check_invariants(arbiter, files, live);
        released += 1;
    }
    released
}

#[proptest]
fn arbitration_is_exclusive_and_always_drains(workload: Workload) {
    let mut files = files(6);
    let mut arbiter = Arbiter::new();
    let mut live: Vec<Ticket> = Vec::new();
    for (request, releases) in workload.requests.iter().zip(&workload.releases) {
        live.push(arbiter.submit(&mut files, &regs(request)));
        check_invariants(&arbiter, &files, &live);
        release_ready(&mut arbiter, &mut files, &mut live, *releases);
    }
    // Executing whatever is ready always makes progress, so the
    // arbiter can never deadlock.
    while !live.is_empty() {
        let released = release_ready(&mut arbiter, &mut files, &mut live, usize::MAX);
        assert!(released > 0, "no request is ready but {} remain", live.len());
    }
    assert_eq!(arbiter.waiting_len(), 0);
    assert!(locked(&files).is_empty());
}
