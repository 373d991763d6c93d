mod reminder_scan;
mod stripe_webhook;
