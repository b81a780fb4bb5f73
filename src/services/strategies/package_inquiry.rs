use std::sync::LazyLock;

use crate::db::queries;
use crate::models::{BookingDraft, CommunicationStyle, DraftStep, Intent, Package, PackageType};
use crate::services::catalog;

use super::{matches_any, patterns, DraftUpdate, PatternSet, StrategyResponse, TurnContext, PAYMENT};

static VOCABULARY: LazyLock<PatternSet> = LazyLock::new(|| {
    patterns(&[
        r"(?i)\b(packages?|price|prices|pricing|cost|costs|how much|rates?|deposit|offers?|services|includ(e|es|ed|ing)|photobook|makeup|outfits?)\b",
        r"(?i)\b(studio|outdoor) (session|shoot|package)s?\b",
    ])
});

static IMAGE_REQUEST: LazyLock<PatternSet> = LazyLock::new(|| {
    patterns(&[r"(?i)\b(backdrops?|portfolio|samples?|pictures? of|photos? of|examples? of your)\b"])
});

static DEPOSIT: LazyLock<PatternSet> =
    LazyLock::new(|| patterns(&[r"(?i)\bdeposits?\b"]));

static PAID: LazyLock<PatternSet> = LazyLock::new(|| {
    patterns(&[r"(?i)\b(paid|sent|transferred|made the (payment|transfer)|receipt|done)\b"])
});

static EVERYTHING: LazyLock<PatternSet> = LazyLock::new(|| {
    patterns(&[r"(?i)\b(each|all( of)? (the|your)? ?packages|every|full details|everything|all details)\b"])
});

static EARLIER_PACKAGES: LazyLock<PatternSet> =
    LazyLock::new(|| patterns(&[r"(?i)\b(the two|those|these|both|them|the ones)\b"]));

static DETAILS: LazyLock<PatternSet> = LazyLock::new(|| {
    patterns(&[
        r"(?i)\b(details?|include|includes|included|what'?s in|tell me (more )?about|more about|what does|how long|duration|explain)\b",
        r"\?",
    ])
});

static OUTDOOR: LazyLock<PatternSet> =
    LazyLock::new(|| patterns(&[r"(?i)\b(outdoor|outside|on location)\b"]));
static STUDIO: LazyLock<PatternSet> =
    LazyLock::new(|| patterns(&[r"(?i)\b(studio|indoor) (sessions?|shoots?|packages?)\b", r"(?i)\bindoor\b"]));

pub fn can_handle(ctx: &TurnContext<'_>) -> bool {
    let text = ctx.message;
    if matches_any(&IMAGE_REQUEST, text) {
        return false;
    }
    if ctx.continues_draft_with_date_or_time() && !matches_any(&PAYMENT, text) {
        return false;
    }
    ctx.assessment.primary_intent == Intent::PackageInquiry
        || matches_any(&VOCABULARY, text)
        || !catalog::mentioned_packages(text, ctx.packages).is_empty()
}

pub async fn generate_response(ctx: &TurnContext<'_>) -> anyhow::Result<Option<StrategyResponse>> {
    let text = ctx.message;

    if let Some(draft) = ctx.active_draft() {
        if draft.step == DraftStep::ConfirmDeposit && matches_any(&PAID, text) {
            return Ok(Some(deposit_status(ctx, draft)?));
        }
    }

    if ctx.packages.is_empty() {
        return Ok(Some(StrategyResponse::canned(
            "Our package list is being updated right now. Please check back shortly, or ask me anything else!",
            "catalog_empty",
        )));
    }

    let mentioned = catalog::mentioned_packages(text, ctx.packages);

    if mentioned.is_empty() {
        if let Some(wanted) = requested_type(text) {
            return Ok(Some(type_listing(ctx, wanted)));
        }
    }

    if matches_any(&DEPOSIT, text) {
        return Ok(Some(deposit_listing(ctx, &mentioned)));
    }

    if matches_any(&EVERYTHING, text) {
        let details: Vec<String> = ordered(ctx, ctx.packages.iter().collect())
            .iter()
            .map(|p| p.detail_view())
            .collect();
        return Ok(Some(StrategyResponse::canned(details.join("\n\n"), "catalog_details")));
    }

    match mentioned.as_slice() {
        [] => Ok(Some(catalog_listing(ctx))),
        [single] if !matches_any(&DETAILS, text) => Ok(Some(select_package(ctx, single))),
        many => {
            let details: Vec<String> = many.iter().map(|p| p.detail_view()).collect();
            let mut reply = details.join("\n\n");
            if many.len() == 1 {
                reply.push_str("\n\nWould you like to book this package?");
            }
            Ok(Some(StrategyResponse::canned(reply, "package_details")))
        }
    }
}

fn requested_type(text: &str) -> Option<PackageType> {
    if matches_any(&OUTDOOR, text) {
        Some(PackageType::Outdoor)
    } else if matches_any(&STUDIO, text) {
        Some(PackageType::Studio)
    } else {
        None
    }
}

fn ordered<'a>(ctx: &TurnContext<'_>, mut packages: Vec<&'a Package>) -> Vec<&'a Package> {
    packages.sort_by_key(|p| !ctx.memory.preferred_packages.contains(&p.name));
    packages
}

fn listing(ctx: &TurnContext<'_>, packages: Vec<&Package>, intro: &str) -> String {
    let lines: Vec<String> = ordered(ctx, packages).iter().map(|p| p.summary_line()).collect();
    if ctx.memory.style == CommunicationStyle::Brief {
        return lines.join("\n");
    }
    format!(
        "{intro}\n{}\n\nWhich one catches your eye? I can share the details of any of them.",
        lines.join("\n")
    )
}

fn catalog_listing(ctx: &TurnContext<'_>) -> StrategyResponse {
    StrategyResponse::canned(
        listing(ctx, ctx.packages.iter().collect(), "Here are our packages:"),
        "catalog_listing",
    )
}

fn type_listing(ctx: &TurnContext<'_>, wanted: PackageType) -> StrategyResponse {
    let matching = catalog::of_type(ctx.packages, wanted);
    if !matching.is_empty() {
        let intro = format!("Here are our {} packages:", wanted.as_str());
        return StrategyResponse::canned(listing(ctx, matching, &intro), "type_listing");
    }

    let other = match wanted {
        PackageType::Studio => PackageType::Outdoor,
        PackageType::Outdoor => PackageType::Studio,
    };
    let intro = format!(
        "We don't have any {} packages at the moment, but here are our {} ones:",
        wanted.as_str(),
        other.as_str()
    );
    StrategyResponse::canned(
        listing(ctx, catalog::of_type(ctx.packages, other), &intro),
        "type_listing",
    )
}

fn deposit_listing(ctx: &TurnContext<'_>, mentioned: &[&Package]) -> StrategyResponse {
    let scoped: Vec<&Package> = if !mentioned.is_empty() {
        mentioned.to_vec()
    } else if matches_any(&EARLIER_PACKAGES, ctx.message) {
        let mut earlier = Vec::new();
        for turn in ctx.recent_assistant_turns(3) {
            for p in catalog::mentioned_packages(&turn.content, ctx.packages) {
                if !earlier.iter().any(|e: &&Package| e.name == p.name) {
                    earlier.push(p);
                }
            }
        }
        earlier
    } else {
        Vec::new()
    };
    let scoped = if scoped.is_empty() {
        ctx.packages.iter().collect()
    } else {
        scoped
    };

    let lines: Vec<String> = scoped
        .iter()
        .map(|p| format!("• {}: deposit {:.0} (full price {:.0})", p.name, p.deposit, p.price))
        .collect();
    StrategyResponse::canned(
        format!(
            "{}\n\nThe deposit secures your slot and is taken off the final price.",
            lines.join("\n")
        ),
        "deposit_info",
    )
}

fn select_package(ctx: &TurnContext<'_>, package: &Package) -> StrategyResponse {
    let mut draft = match ctx.active_draft() {
        Some(d) if !d.step.is_committed() => d.clone(),
        _ => BookingDraft::new(&ctx.customer.id),
    };
    draft.service = Some(package.name.clone());
    draft.updated_at = chrono::Utc::now().naive_utc();
    let step = draft.advance();

    let reply = match step {
        DraftStep::Review => format!("{}\n\n{}", draft.summary(), step.prompt()),
        DraftStep::CollectDate | DraftStep::CollectTime => format!(
            "Great choice! The {} is {:.0} for {}. What date and time would you like to come in?",
            package.name, package.price, package.duration
        ),
        other => format!("Great choice! The {} it is. {}", package.name, other.prompt()),
    };
    tracing::info!(customer = %ctx.customer.id, package = %package.name, step = step.as_str(), "package selected");
    StrategyResponse::canned(reply, "package_selected").with_draft(DraftUpdate::Save(draft))
}

fn deposit_status(ctx: &TurnContext<'_>, draft: &BookingDraft) -> anyhow::Result<StrategyResponse> {
    let reference = match &draft.booking_id {
        Some(id) => ctx
            .state
            .db
            .call(|conn| queries::get_booking_by_id(conn, id))?
            .and_then(|b| b.payment_reference),
        None => None,
    };
    let reply = match reference {
        Some(reference) => format!(
            "Thank you! We'll confirm your booking as soon as the deposit with reference {reference} reaches us."
        ),
        None => "Thank you! We'll confirm your booking as soon as the deposit reaches us.".to_string(),
    };
    Ok(StrategyResponse::canned(reply, "deposit_pending"))
}
