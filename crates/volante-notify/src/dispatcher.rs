use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use volante_core::error::Result;
use volante_core::events::DomainEvent;
use volante_core::models::{Notification, NotificationPriority};
use volante_core::store::{EntityStore, Repository};

/// Fan-out of domain events to recipient inboxes. Creation success is the
/// only delivery signal; there are no retries.
pub struct NotificationDispatcher {
    notifications: Repository<Notification>,
}

impl NotificationDispatcher {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        NotificationDispatcher {
            notifications: Repository::new(store),
        }
    }

    pub async fn emit(&self, event: &DomainEvent) -> Result<Notification> {
        let draft = render(event);
        self.notifications.create(&draft).await
    }
}

/// Pure mapping from a domain event to an inbox record.
fn render(event: &DomainEvent) -> Notification {
    let now = Utc::now();
    let blank = Notification {
        id: Uuid::new_v4(),
        created_by: String::new(),
        recipient_user_id: String::new(),
        title: String::new(),
        message: String::new(),
        kind: String::new(),
        priority: NotificationPriority::Normal,
        reference_type: None,
        reference_id: None,
        is_read: false,
        action_url: None,
        created_date: now,
        updated_date: now,
    };

    match event {
        DomainEvent::RideRequested {
            ride_id,
            driver_owner,
            requester_name,
            destination_address,
            offered_price,
            is_emergency: true,
        } => Notification {
            recipient_user_id: driver_owner.clone(),
            title: "🚨 EMERGÊNCIA BLITZ!".to_string(),
            message: format!(
                "⚠️ URGENTE! {requester_name} parou na blitz e precisa de um motorista AGORA! \
                 Destino: {destination_address}. Valor: R$ {offered_price:.2} (Lei 13.546/2017)"
            ),
            kind: "ride_request".to_string(),
            priority: NotificationPriority::Urgent,
            reference_type: Some("ride".to_string()),
            reference_id: Some(*ride_id),
            action_url: Some("/PainelMotorista".to_string()),
            ..blank
        },
        DomainEvent::RideRequested {
            ride_id,
            driver_owner,
            requester_name,
            destination_address,
            offered_price,
            is_emergency: false,
        } => Notification {
            recipient_user_id: driver_owner.clone(),
            title: "🚗 Nova Solicitação de Corrida!".to_string(),
            message: format!(
                "{requester_name} precisa de um motorista. \
                 Destino: {destination_address}. Valor: R$ {offered_price:.2}"
            ),
            kind: "ride_request".to_string(),
            priority: NotificationPriority::High,
            reference_type: Some("ride".to_string()),
            reference_id: Some(*ride_id),
            action_url: Some("/PainelMotorista".to_string()),
            ..blank
        },
        DomainEvent::RideAccepted {
            ride_id,
            requester,
            driver_name,
        } => Notification {
            recipient_user_id: requester.clone(),
            title: "✅ Motorista Aceito!".to_string(),
            message: format!("{driver_name} aceitou sua solicitação e está a caminho!"),
            kind: "ride_status".to_string(),
            priority: NotificationPriority::High,
            reference_type: Some("ride".to_string()),
            reference_id: Some(*ride_id),
            action_url: Some("/MinhasCorridas".to_string()),
            ..blank
        },
        DomainEvent::PaymentReceived {
            ride_id,
            driver_owner,
            amount,
            vehicle_plate,
        } => Notification {
            recipient_user_id: driver_owner.clone(),
            title: "💰 Pagamento Recebido!".to_string(),
            message: format!("Você recebeu R$ {amount:.2} pela corrida {vehicle_plate}"),
            kind: "payment".to_string(),
            priority: NotificationPriority::Normal,
            reference_type: Some("ride".to_string()),
            reference_id: Some(*ride_id),
            ..blank
        },
        DomainEvent::WalletTopUp {
            owner,
            amount,
            new_balance,
        } => Notification {
            recipient_user_id: owner.clone(),
            title: "💰 Créditos Adicionados!".to_string(),
            message: format!(
                "R$ {amount:.2} foram adicionados à sua carteira. Novo saldo: R$ {new_balance:.2}"
            ),
            kind: "wallet".to_string(),
            priority: NotificationPriority::Normal,
            reference_type: Some("topup".to_string()),
            ..blank
        },
    }
}
