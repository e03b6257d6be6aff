use qmgr::scheduler::{Entry, Job, NoMoreRecipients, TransportScheduler};

#[test]
fn s6_scheduler_preemption() {
    let mut sched = TransportScheduler::new(5, 1, 3, 50, 0);

    let mut current = Job::new(1, 2000, 50, 50);
    current.selected_entries = 10;
    current.slots_available = 20;
    sched.add_job(current);

    let candidate = Job::new(2, 1990, 6, 6);
    sched.add_job(candidate);

    // max_slots = (50 - 10 + 20) / 5 = 12 >= 6
    // acceptance: 20/5 + 3 = 7 >= 6*50/100 = 3
    let winner = sched.candidate(1, 2001);
    assert_eq!(winner, Some(2));

    // Priming the cache above must not stop `preempt` from seeing and
    // invalidating it once the push actually happens.
    let pushed = sched.preempt(1, 2001).expect("candidate clears the slot-loan budget");
    assert_eq!(pushed, 2);
    assert_eq!(sched.job(2).unwrap().stack_level, 1);
    assert_eq!(sched.current(), Some(2));

    // A later query at the same second must not see the stale pre-push
    // answer; the list head has a new stacked job on top of it now.
    assert_eq!(sched.candidate(1, 2001), None);
}

#[test]
fn entry_selection_prefers_the_stack_top_over_the_list_head() {
    let mut sched = TransportScheduler::new(5, 1, 3, 50, 0);

    let mut current = Job::new(1, 2000, 50, 50);
    current.slots_available = 20;
    current.push_entry("list-head.example.com", Entry { recipient: "x@example.com".to_string() });
    sched.add_job(current);

    let mut candidate = Job::new(2, 1990, 6, 6);
    candidate.push_entry("stack-top.example.com", Entry { recipient: "y@example.com".to_string() });
    sched.add_job(candidate);

    sched.preempt(1, 2001);
    assert_eq!(sched.current(), Some(2));

    let mut source = NoMoreRecipients;
    let always_ready = |_: &str| true;
    let (job_id, dest, entry) = sched
        .entry_select(2001, &always_ready, &mut source)
        .expect("the stacked job has a ready entry");
    assert_eq!(job_id, 2);
    assert_eq!(dest, "stack-top.example.com");
    assert_eq!(entry.recipient, "y@example.com");

    // The stacked job's single entry is now exhausted; the next
    // selection pops it and falls through to the list head.
    let (job_id, dest, _entry) = sched
        .entry_select(2001, &always_ready, &mut source)
        .expect("the list head still has a ready entry");
    assert_eq!(job_id, 1);
    assert_eq!(dest, "list-head.example.com");
    assert_eq!(sched.current(), Some(1));
}
