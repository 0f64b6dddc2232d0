use std::{collections::HashMap, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use client_core::{
    ChatRegistry, ContactResolver, GroupControl, GroupTransport, InMemoryContactRegistry,
};
use shared::{
    domain::{Jid, Member, Role},
    protocol::MessageContent,
};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Drives two in-process clients through a full group lifecycle over a
/// loopback transport: create, subject change, leave.
#[derive(Parser, Debug)]
struct Args {
    #[arg(long, default_value = "alice@example.com")]
    owner: String,
    #[arg(long, default_value = "bob@example.com")]
    invitee: String,
    #[arg(long, default_value = "Weekend trip")]
    subject: String,
}

/// Routes outbound messages straight into the recipient's inbound pipeline,
/// keyed by bare JID.
struct LoopbackNetwork {
    clients: Mutex<HashMap<String, Arc<GroupControl>>>,
}

impl LoopbackNetwork {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            clients: Mutex::new(HashMap::new()),
        })
    }

    async fn register(&self, jid: &Jid, control: Arc<GroupControl>) {
        self.clients
            .lock()
            .await
            .insert(jid.bare().to_string(), control);
    }
}

struct LoopbackTransport {
    from: Jid,
    network: Arc<LoopbackNetwork>,
}

#[async_trait]
impl GroupTransport for LoopbackTransport {
    async fn send(&self, recipients: &[Jid], content: MessageContent) -> bool {
        let mut delivered = true;
        for recipient in recipients {
            let target = {
                let clients = self.network.clients.lock().await;
                clients.get(&recipient.bare().to_string()).cloned()
            };
            let Some(control) = target else {
                warn!("no route to {recipient}");
                delivered = false;
                continue;
            };
            if let Err(rejected) = control.handle_incoming(&content, &self.from).await {
                warn!("{recipient} dropped command: {rejected}");
            }
        }
        delivered
    }
}

struct DemoClient {
    control: Arc<GroupControl>,
    registry: Arc<ChatRegistry>,
    contacts: Arc<InMemoryContactRegistry>,
}

async fn build_client(jid: Jid, network: &Arc<LoopbackNetwork>) -> DemoClient {
    let registry = ChatRegistry::new();
    let contacts = Arc::new(InMemoryContactRegistry::new());
    let transport = Arc::new(LoopbackTransport {
        from: jid.bare(),
        network: Arc::clone(network),
    });
    let control = Arc::new(GroupControl::new(
        jid.clone(),
        Arc::clone(&registry),
        Arc::clone(&contacts) as Arc<dyn ContactResolver>,
        transport as Arc<dyn GroupTransport>,
    ));
    network.register(&jid, Arc::clone(&control)).await;
    DemoClient {
        control,
        registry,
        contacts,
    }
}

async fn dump_group_chats(label: &str, registry: &ChatRegistry) {
    for chat in registry.group_chats().await {
        let guard = chat.lock().await;
        let members: Vec<String> = guard
            .members()
            .iter()
            .map(|member| {
                let marker = if member.is_owner() { "*" } else { "" };
                format!("{}{marker}", member.contact.jid)
            })
            .collect();
        info!(
            "{label}: group {} subject={:?} valid={} members=[{}]",
            guard.identity().group_id(),
            guard.subject(),
            guard.is_valid(),
            members.join(", ")
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    let owner_jid = Jid::parse(&args.owner).context("invalid --owner jid")?;
    let invitee_jid = Jid::parse(&args.invitee).context("invalid --invitee jid")?;

    let network = LoopbackNetwork::new();
    let owner = build_client(owner_jid.clone(), &network).await;
    let invitee = build_client(invitee_jid.clone(), &network).await;

    let mut invitee_events = invitee.registry.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = invitee_events.recv().await {
            info!("invitee chat event: {event:?}");
        }
    });

    // The owner assembles the group locally, then announces it.
    let owner_contact = owner
        .contacts
        .get_or_create_contact(&owner_jid)
        .await
        .context("owner contact")?;
    let invitee_contact = owner
        .contacts
        .get_or_create_contact(&invitee_jid)
        .await
        .context("invitee contact")?;
    let identity = owner.control.new_group_identity();
    let chat = owner
        .registry
        .create_group(
            vec![
                Member::new(owner_contact, Role::Owner),
                Member::new(invitee_contact, Role::Participant),
            ],
            identity,
        )
        .await;

    if !owner.control.on_local_create(&chat).await {
        warn!("group announcement was not delivered to every member");
    }
    dump_group_chats("owner", &owner.registry).await;
    dump_group_chats("invitee", &invitee.registry).await;

    if !owner
        .control
        .on_local_set_subject(&chat, &args.subject)
        .await
    {
        warn!("subject change failed");
    }
    dump_group_chats("invitee", &invitee.registry).await;

    // The owner leaves; the invitee's copy of the chat goes inactive.
    if owner.control.on_local_delete(&chat).await {
        let chat_id = chat.lock().await.id();
        owner.registry.remove(chat_id).await;
    }
    dump_group_chats("owner", &owner.registry).await;
    dump_group_chats("invitee", &invitee.registry).await;

    // Let the event logger drain before shutdown.
    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(())
}
