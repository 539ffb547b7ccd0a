//! Shared email content
//!
//! Used by both the SES and the mock service so tests see exactly what
//! production would send.

use uuid::Uuid;

use crate::InvitationEmail;

pub fn team_invitation_subject(team_name: &str, event_name: &str) -> String {
    format!("You're invited to join {team_name} for {event_name}")
}

/// Plain-text body for a team invitation
pub fn team_invitation_text(invitation: &InvitationEmail, respond_url: &str) -> String {
    format!(
        "Hi {recipient},\n\n\
        {inviter} has invited you to join the team '{team}' for {event}.\n\n\
        \"{message}\"\n\n\
        Accept or decline the invitation here:\n\
        {url}\n\n\
        Thanks,\n\
        The Enlist Team",
        recipient = invitation.recipient_name,
        inviter = invitation.inviter_name,
        team = invitation.team_name,
        event = invitation.event_name,
        message = invitation.message,
        url = respond_url,
    )
}

pub fn team_invitation_html(invitation: &InvitationEmail, respond_url: &str) -> String {
    format!(
        r#"
            <html>
            <body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
                <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
                    <h2 style="color: #2a7d4f;">Join {team} for {event}</h2>

                    <p>Hi {recipient},</p>

                    <p><strong>{inviter}</strong> has invited you to join the team '<strong>{team}</strong>'.</p>

                    <blockquote style="border-left: 3px solid #ccc; margin: 20px 0; padding-left: 12px; color: #555;">
                        {message}
                    </blockquote>

                    <div style="text-align: center; margin: 30px 0;">
                        <a href="{url}"
                           style="background-color: #2a7d4f; color: white; padding: 12px 24px; text-decoration: none; border-radius: 4px; display: inline-block; font-weight: bold;">
                            Respond to Invitation
                        </a>
                    </div>

                    <p style="color: #666; font-size: 12px;">Thanks, The Enlist Team</p>
                </div>
            </body>
            </html>
            "#,
        recipient = invitation.recipient_name,
        inviter = invitation.inviter_name,
        team = invitation.team_name,
        event = invitation.event_name,
        message = invitation.message,
        url = respond_url,
    )
}

pub fn team_disbanded_text(team_name: &str, event_name: &str) -> String {
    format!(
        "Hi there,\n\n\
        The team '{team_name}' registered for {event_name} has been disbanded \
        and its registration withdrawn.\n\n\
        You are free to join or create another team for this event.\n\n\
        Thanks,\n\
        The Enlist Team"
    )
}

pub fn registration_received_text(recipient_name: &str, event_name: &str) -> String {
    format!(
        "Hi {recipient_name},\n\n\
        We received your registration for {event_name}. \
        It will be confirmed once payment is complete.\n\n\
        Thanks,\n\
        The Enlist Team"
    )
}

pub fn payment_confirmed_text(event_name: &str, amount: &str, payment_id: Uuid) -> String {
    format!(
        "Hi there,\n\n\
        Your payment of {amount} for {event_name} has been confirmed.\n\
        Payment reference: {payment_id}\n\n\
        See you at the event!\n\
        The Enlist Team"
    )
}
