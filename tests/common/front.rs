//! A "mock" (totally local) front service for passing around consensus frames.

use std::{
    collections::HashMap,
    sync::{
        mpsc::{self, Receiver, Sender},
        Arc, Mutex,
    },
    thread,
};

use pbft_rs::pluggables::{FrontService, MessageDispatcher, ModuleId};
use pbft_rs::types::crypto_primitives::VerifyingKey;

type Delivery = (VerifyingKey, Vec<u8>);

/// A front service stub that passes frames to and from nodes using channels.
///
/// Registering a dispatcher spawns a pump thread that drains this node's inbox and invokes the
/// dispatcher for every delivery, attaching a responder that routes response frames back into the
/// sender's inbox.
///
/// ## Limitations
///
/// The set of peers reachable from a given `FrontStub` is fixed on construction by
/// [`mock_front_net`]. Tests that change the consensus-node set must plan ahead and create the
/// net with extra identities.
#[derive(Clone)]
pub struct FrontStub {
    my_key: VerifyingKey,
    all_peers: Arc<HashMap<VerifyingKey, Sender<Delivery>>>,
    inbox: Arc<Mutex<Option<Receiver<Delivery>>>>,
}

impl FrontService for FrontStub {
    fn register_message_dispatcher(&mut self, _: ModuleId, dispatcher: MessageDispatcher) {
        let inbox = self
            .inbox
            .lock()
            .unwrap()
            .take()
            .expect("a dispatcher was already registered with this FrontStub");
        let all_peers = self.all_peers.clone();
        let my_key = self.my_key;

        thread::spawn(move || {
            while let Ok((from, data)) = inbox.recv() {
                let responder = all_peers.get(&from).cloned().map(|reply_to| {
                    Box::new(move |response: Vec<u8>| {
                        let _ = reply_to.send((my_key, response));
                    }) as Box<dyn FnOnce(Vec<u8>) + Send>
                });
                dispatcher(Ok(()), from, data, responder);
            }
        });
    }

    fn async_send_message_by_node_ids(
        &self,
        _: ModuleId,
        node_ids: &[VerifyingKey],
        data: Vec<u8>,
    ) {
        for node_id in node_ids {
            if let Some(peer) = self.all_peers.get(node_id) {
                let _ = peer.send((self.my_key, data.clone()));
            }
        }
    }
}

/// Create a vector of `FrontStub`s connecting the provided set of `peers`.
///
/// `FrontStub`s feature in the returned vector in the same order as the provided `peers`, i.e.,
/// the i-th stub is the front service for the i-th peer.
pub fn mock_front_net(peers: impl Iterator<Item = VerifyingKey>) -> Vec<FrontStub> {
    let mut all_peers = HashMap::new();
    let peers_and_inboxes: Vec<(VerifyingKey, Receiver<Delivery>)> = peers
        .map(|peer| {
            let (sender, receiver) = mpsc::channel();
            all_peers.insert(peer, sender);
            (peer, receiver)
        })
        .collect();

    let all_peers = Arc::new(all_peers);
    peers_and_inboxes
        .into_iter()
        .map(|(my_key, inbox)| FrontStub {
            my_key,
            all_peers: all_peers.clone(),
            inbox: Arc::new(Mutex::new(Some(inbox))),
        })
        .collect()
}
