//! End-to-end tests of the public contract: hierarchical state machines
//! running inside active objects, fed by the broker and by timers.

use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use reflex_af::hsm::top;
use reflex_af::{
    ActiveObject, Behavior, Broker, DispatchError, Disposition, Event, Hsm, Mailbox, PumpExit,
    Response, Signal, Timer,
};

const TOGGLE: Signal = Signal::user(0);
const REQUEST: Signal = Signal::user(1);
const REPLY: Signal = Signal::user(2);
const TICK: Signal = Signal::user(3);

/// A two-state lamp wired as a full HSM behavior: subscribes to TOGGLE in
/// `on_start`, reports every entry to the `on` state through a channel.
struct LampCtx {
    name: &'static str,
    broker: Arc<Broker>,
    mailbox: Mailbox,
    probe: mpsc::Sender<&'static str>,
}

fn lamp_initial(_ctx: &mut LampCtx, _evt: &Event) -> Response<LampCtx> {
    Response::Transition(lamp_off)
}

fn lamp_off(_ctx: &mut LampCtx, evt: &Event) -> Response<LampCtx> {
    match evt.signal() {
        TOGGLE => Response::Transition(lamp_on),
        _ => Response::Super(top),
    }
}

fn lamp_on(ctx: &mut LampCtx, evt: &Event) -> Response<LampCtx> {
    match evt.signal() {
        Signal::ENTRY => {
            let _ = ctx.probe.send(ctx.name);
            Response::Handled
        }
        TOGGLE => Response::Transition(lamp_off),
        _ => Response::Super(top),
    }
}

struct Lamp {
    hsm: Hsm<LampCtx>,
    ctx: LampCtx,
}

impl Lamp {
    fn new(
        name: &'static str,
        broker: Arc<Broker>,
        mailbox: Mailbox,
        probe: mpsc::Sender<&'static str>,
    ) -> Self {
        Self {
            hsm: Hsm::new(lamp_initial),
            ctx: LampCtx {
                name,
                broker,
                mailbox,
                probe,
            },
        }
    }
}

impl Behavior for Lamp {
    fn on_start(&mut self) -> Result<(), DispatchError> {
        self.ctx.broker.subscribe(TOGGLE, &self.ctx.mailbox);
        self.hsm.init(&mut self.ctx)
    }

    fn on_event(&mut self, event: &Event) -> Result<Disposition, DispatchError> {
        self.hsm.dispatch(&mut self.ctx, event)
    }
}

#[test]
fn published_events_drive_hsms_in_every_subscriber() {
    let broker = Arc::new(Broker::new());
    let (tx, rx) = mpsc::channel();

    let left = ActiveObject::new("left", Arc::clone(&broker));
    let left_lamp = Lamp::new("left", Arc::clone(&broker), left.mailbox(), tx.clone());
    let left = left.spawn(left_lamp);

    let right = ActiveObject::new("right", Arc::clone(&broker));
    let right_lamp = Lamp::new("right", Arc::clone(&broker), right.mailbox(), tx);
    let right = right.spawn(right_lamp);

    // Give both pumps a moment to run on_start and subscribe.
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while broker.subscriber_count(TOGGLE) < 2 {
        assert!(std::time::Instant::now() < deadline, "subscriptions missing");
        std::thread::sleep(Duration::from_millis(1));
    }

    // Three toggles: both lamps go on, off, on again.
    for _ in 0..3 {
        assert_eq!(broker.publish(&Event::new(TOGGLE)), 2);
    }
    left.stop().unwrap();
    right.stop().unwrap();
    assert_eq!(left.join(), PumpExit::Terminated);
    assert_eq!(right.join(), PumpExit::Terminated);

    let mut entries: Vec<&str> = rx.try_iter().collect();
    entries.sort_unstable();
    assert_eq!(entries, ["left", "left", "right", "right"]);
}

/// Request/reply between two objects: the request payload carries the
/// requester's mailbox, the responder answers directly, and the requester
/// terminates itself after the reply.
struct Responder {
    broker: Arc<Broker>,
    mailbox: Mailbox,
}

impl Behavior for Responder {
    fn on_start(&mut self) -> Result<(), DispatchError> {
        self.broker.subscribe(REQUEST, &self.mailbox);
        Ok(())
    }

    fn on_event(&mut self, event: &Event) -> Result<Disposition, DispatchError> {
        if event.signal() == REQUEST {
            if let Some(requester) = event.payload::<Mailbox>() {
                let _ = requester.post(Event::new(REPLY));
            }
        }
        Ok(Disposition::Handled)
    }
}

struct Requester {
    mailbox: Mailbox,
    got_reply: mpsc::Sender<()>,
}

impl Behavior for Requester {
    fn on_event(&mut self, event: &Event) -> Result<Disposition, DispatchError> {
        if event.signal() == REPLY {
            let _ = self.got_reply.send(());
            let _ = self.mailbox.post(Event::terminate());
        }
        Ok(Disposition::Handled)
    }
}

#[test]
fn request_reply_round_trip_and_self_termination() {
    let broker = Arc::new(Broker::new());
    let (tx, rx) = mpsc::channel();

    let responder = ActiveObject::new("responder", Arc::clone(&broker));
    let responder_behavior = Responder {
        broker: Arc::clone(&broker),
        mailbox: responder.mailbox(),
    };
    let responder = responder.spawn(responder_behavior);

    let requester = ActiveObject::new("requester", Arc::clone(&broker));
    let requester_mailbox = requester.mailbox();
    let requester = requester.spawn(Requester {
        mailbox: requester_mailbox.clone(),
        got_reply: tx,
    });

    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while broker.subscriber_count(REQUEST) < 1 {
        assert!(std::time::Instant::now() < deadline, "subscription missing");
        std::thread::sleep(Duration::from_millis(1));
    }

    assert_eq!(
        broker.publish(&Event::with_payload(REQUEST, requester_mailbox)),
        1
    );

    rx.recv_timeout(Duration::from_secs(2)).expect("reply");
    assert_eq!(requester.join(), PumpExit::Terminated);
    assert!(!requester.is_alive());

    responder.stop().unwrap();
    assert_eq!(responder.join(), PumpExit::Terminated);
}

/// Periodic behavior by re-arming from the receiving reaction: three ticks,
/// then cooperative self-termination.
struct Metronome {
    mailbox: Mailbox,
    timer: Timer,
    beats: u32,
    done: mpsc::Sender<u32>,
}

impl Behavior for Metronome {
    fn on_start(&mut self) -> Result<(), DispatchError> {
        self.timer.fire_in(Duration::from_millis(10), Event::new(TICK));
        Ok(())
    }

    fn on_event(&mut self, event: &Event) -> Result<Disposition, DispatchError> {
        if event.signal() == TICK {
            self.beats += 1;
            if self.beats < 3 {
                self.timer.fire_in(Duration::from_millis(10), Event::new(TICK));
            } else {
                let _ = self.done.send(self.beats);
                let _ = self.mailbox.post(Event::terminate());
            }
        }
        Ok(Disposition::Handled)
    }
}

#[test]
fn timer_rearmed_from_reactions_ticks_periodically() {
    let broker = Arc::new(Broker::new());
    let (tx, rx) = mpsc::channel();

    let ao = ActiveObject::new("metronome", broker);
    let mailbox = ao.mailbox();
    let handle = ao.spawn(Metronome {
        timer: Timer::new(&mailbox),
        mailbox,
        beats: 0,
        done: tx,
    });

    let beats = rx.recv_timeout(Duration::from_secs(2)).expect("beats");
    assert_eq!(beats, 3);
    assert_eq!(handle.join(), PumpExit::Terminated);
}
