// Enlist - Local development runner
//
// Wires the application from the environment, seeds a demo event with a few
// users and walks one team through formation, acceptance and payment.

use enlist_app::Application;
use enlist_common::{telemetry, Config};
use enlist_email::EmailConfig;
use enlist_teams::{
    CreateTeamRequest, Event, InvitationDecision, InvitationResponse, ResponseOutcome, User,
};
use rust_decimal::Decimal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    telemetry::init_tracing(&config);

    info!("Starting Enlist local runner");

    let email_config = EmailConfig::from_env().map_err(|e| {
        error!("Failed to load email configuration: {}", e);
        e
    })?;

    let app = enlist_app::create_app(config, email_config)
        .await
        .map_err(|e| {
            error!("Failed to create application: {:#}", e);
            e
        })?;

    info!(?app, "Application ready");

    run_demo(&app).await?;

    info!("Local runner finished");
    Ok(())
}

async fn run_demo(app: &Application) -> anyhow::Result<()> {
    let event = Event::team("Local Hackathon", 2, 4)?;
    app.services.repos.events.create(&event).await?;

    let leader = User::new("leader@enlist.local", "Lee Leader")?;
    let member = User::new("member@enlist.local", "Mel Member")?;
    for user in [&leader, &member] {
        app.services.repos.users.create(user).await?;
    }

    let created = app
        .services
        .formation
        .create_team_and_invite(CreateTeamRequest {
            event_id: event.id,
            leader_id: leader.id,
            team_name: "Night Owls".to_string(),
            member_emails: vec![member.email.clone()],
            message: None,
        })
        .await?;
    info!(team_id = %created.team.id, "Demo team created");

    for invitation in &created.invitations {
        let outcome = app
            .services
            .formation
            .respond_to_invitation(InvitationResponse {
                invitation_id: invitation.id,
                responder_id: member.id,
                responder_email: member.email.clone(),
                decision: InvitationDecision::Accept,
            })
            .await?;
        if let ResponseOutcome::Accepted { registration, .. } = outcome {
            info!(status = %registration.status, "Demo invitation accepted");
        }
    }

    let payment = app
        .services
        .payments
        .initiate(
            leader.id,
            event.id,
            created.registration.id,
            Decimal::new(2500, 2),
        )
        .await?;
    let registration = app
        .services
        .payments
        .confirm(payment.id, created.registration.id)
        .await?;
    info!(
        registration_id = %registration.id,
        status = %registration.status,
        "Demo payment confirmed"
    );

    Ok(())
}
