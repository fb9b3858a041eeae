//! Email bodies.

use crate::types::{OtpCode, SlotKey};

use super::{Attachment, OutgoingEmail};

/// File name of the QR attachment on confirmation emails
pub const QR_ATTACHMENT_NAME: &str = "booking-qr.png";

/// Address students are pointed to for refunds
pub const REFUND_CONTACT: &str = "staff@utm.my";

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

fn layout(heading_color: &str, heading: &str, content: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="UTF-8"><title>{heading}</title></head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
    <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
        <h2 style="color: {heading_color};">{heading}</h2>
        {content}
    </div>
</body>
</html>"#
    )
}

fn slot_line(slot: &SlotKey) -> String {
    format!(
        "<b>{}</b> on {} - {}",
        escape(&slot.venue_name),
        slot.start_time.format("%H:%M"),
        slot.end_time.format("%H:%M")
    )
}

/// Registration code
#[must_use]
pub fn registration_otp(to: &str, name: &str, code: OtpCode, valid_minutes: i64) -> OutgoingEmail {
    let content = format!(
        r#"<p>Dear <b>{}</b>,</p>
        <p>Your one-time password for email verification is:</p>
        <p style="font-size: 1.5em; color: #2E8B57; font-weight: bold;">{code}</p>
        <p>This code will expire in {valid_minutes} minutes.</p>
        <p><em>If you did not request this, please ignore this email.</em></p>"#,
        escape(name)
    );
    OutgoingEmail {
        to: to.to_string(),
        subject: "Your OTP Code for UTM Booking".to_string(),
        html_body: layout("#2E8B57", "UTM Email Verification", &content),
        attachment: None,
    }
}

/// Password-reset code
#[must_use]
pub fn password_reset_otp(to: &str, name: &str, code: OtpCode, valid_minutes: i64) -> OutgoingEmail {
    let content = format!(
        r#"<p>Dear <b>{}</b>,</p>
        <p>Your one-time password for password reset is:</p>
        <p style="font-size: 1.5em; color: #2E8B57; font-weight: bold;">{code}</p>
        <p>This code will expire in {valid_minutes} minutes.</p>
        <p><em>If you did not request this, please ignore this email.</em></p>"#,
        escape(name)
    );
    OutgoingEmail {
        to: to.to_string(),
        subject: "Your Password Reset OTP".to_string(),
        html_body: layout("#2E8B57", "Password Reset Request", &content),
        attachment: None,
    }
}

/// Payment accepted; carries the QR code to present at the venue
#[must_use]
pub fn booking_confirmed(to: &str, slot: &SlotKey, qr_png: Vec<u8>) -> OutgoingEmail {
    let content = format!(
        r#"<p>Dear <b>{}</b>,</p>
        <p>Your booking for {} is <span style="color: green; font-weight: bold;">confirmed</span>!</p>
        <p>Please present the attached QR code at the facility entrance.</p>
        <p><em>Thank you for booking with UTM!</em></p>"#,
        escape(to),
        slot_line(slot)
    );
    OutgoingEmail {
        to: to.to_string(),
        subject: "Your Booking is Confirmed!".to_string(),
        html_body: layout("#2E8B57", "UTM Booking Confirmation", &content),
        attachment: Some(Attachment {
            filename: QR_ATTACHMENT_NAME.to_string(),
            content_type: "image/png".to_string(),
            data: qr_png,
        }),
    }
}

/// Payment rejected
#[must_use]
pub fn booking_rejected(to: &str, slot: &SlotKey) -> OutgoingEmail {
    let content = format!(
        r#"<p>Dear <b>{}</b>,</p>
        <p>Unfortunately, your booking for {} was <span style="color: red; font-weight: bold;">rejected</span>.</p>
        <p>Please try again or contact support if you need assistance.</p>
        <p><em>We hope to serve you soon!</em></p>"#,
        escape(to),
        slot_line(slot)
    );
    OutgoingEmail {
        to: to.to_string(),
        subject: "Your Booking was Rejected".to_string(),
        html_body: layout("#B22222", "UTM Booking Update", &content),
        attachment: None,
    }
}

/// Booking cancelled at the student's request
#[must_use]
pub fn booking_cancelled(to: &str, slot: &SlotKey) -> OutgoingEmail {
    let content = format!(
        r#"<p>Dear <b>{}</b>,</p>
        <p>Your booking for {} has been <span style="color: red; font-weight: bold;">cancelled</span> as per your request.</p>
        <p>If this was a mistake, please make a new booking.</p>
        <p style="color: #2E8B57;"><b>For refund, please contact <a href="mailto:{REFUND_CONTACT}">{REFUND_CONTACT}</a> and provide them with the necessary information for your refund.</b></p>
        <p><em>Thank you for using UTM Booking System!</em></p>"#,
        escape(to),
        slot_line(slot)
    );
    OutgoingEmail {
        to: to.to_string(),
        subject: "Your Booking Has Been Cancelled".to_string(),
        html_body: layout("#B22222", "Booking Cancelled", &content),
        attachment: None,
    }
}

/// Booking removed by the student or by staff
#[must_use]
pub fn booking_deleted(to: &str, slot: &SlotKey) -> OutgoingEmail {
    let content = format!(
        r#"<p>Dear <b>{}</b>,</p>
        <p>Your booking for {} has been removed and the time slot released.</p>
        <p>If you paid for this booking, contact <a href="mailto:{REFUND_CONTACT}">{REFUND_CONTACT}</a> about a refund.</p>"#,
        escape(to),
        slot_line(slot)
    );
    OutgoingEmail {
        to: to.to_string(),
        subject: "Your Booking Was Removed".to_string(),
        html_body: layout("#B22222", "Booking Removed", &content),
        attachment: None,
    }
}
