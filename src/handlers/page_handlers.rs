//! Server-rendered pages for the tour site.
//!
//! The visual layer of the original site (shader backgrounds, sprite
//! players, page transitions) was purely cosmetic; these pages keep the copy
//! and structure and skip the effects.

use crate::{AppState, services::board::{BoardPhase, SortOrder}};
use axum::{
    extract::{Query, State},
    response::Html,
};
use chrono::{DateTime, Utc};

use super::message_handlers::ListQuery;

struct TourDate {
    date: &'static str,
    city: &'static str,
    location: &'static str,
    ticket_link: &'static str,
    sold_out: bool,
}

const TOUR_DATES: [TourDate; 7] = [
    TourDate {
        date: "12. MAR 2025",
        city: "KØBENHAVN",
        location: "VEGA",
        ticket_link: "https://billetto.dk/strikogdrik-kobenhavn",
        sold_out: false,
    },
    TourDate {
        date: "19. MAR 2025",
        city: "AARHUS",
        location: "TRAIN",
        ticket_link: "https://billetto.dk/strikogdrik-aarhus",
        sold_out: false,
    },
    TourDate {
        date: "26. MAR 2025",
        city: "ODENSE",
        location: "POSTEN",
        ticket_link: "https://billetto.dk/strikogdrik-odense",
        sold_out: true,
    },
    TourDate {
        date: "02. APR 2025",
        city: "AALBORG",
        location: "SKRÅEN",
        ticket_link: "https://billetto.dk/strikogdrik-aalborg",
        sold_out: false,
    },
    TourDate {
        date: "09. APR 2025",
        city: "ESBJERG",
        location: "TOBAKKEN",
        ticket_link: "https://billetto.dk/strikogdrik-esbjerg",
        sold_out: false,
    },
    TourDate {
        date: "16. APR 2025",
        city: "HERNING",
        location: "FERMATEN",
        ticket_link: "https://billetto.dk/strikogdrik-herning",
        sold_out: false,
    },
    TourDate {
        date: "23. APR 2025",
        city: "ROSKILDE",
        location: "GIMLE",
        ticket_link: "https://billetto.dk/strikogdrik-roskilde",
        sold_out: false,
    },
];

fn page(title: &str, body: &str) -> Html<String> {
    Html(format!(
        r#"<!doctype html>
<html lang="da">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title} — STRIK &amp; DRIK</title>
<style>
body {{ background: #0b0010; color: #f3e8ff; font-family: system-ui, sans-serif; margin: 0; }}
main {{ max-width: 48rem; margin: 0 auto; padding: 2rem 1rem; }}
a {{ color: #f472b6; }}
nav a {{ margin-right: 1rem; font-weight: 600; text-decoration: none; }}
h1 {{ color: #f472b6; letter-spacing: 0.1em; }}
.card {{ background: rgba(0,0,0,0.4); border: 1px solid rgba(236,72,153,0.25); border-radius: 1rem; padding: 1rem; margin-bottom: 1rem; }}
.muted {{ color: rgba(243,232,255,0.6); font-size: 0.85rem; }}
.soldout {{ color: #f87171; font-weight: 700; }}
button.like {{ background: rgba(0,0,0,0.4); border: 1px solid rgba(236,72,153,0.35); color: #f3e8ff; border-radius: 0.5rem; padding: 0.25rem 0.75rem; cursor: pointer; }}
button.like.liked {{ background: rgba(236,72,153,0.4); }}
img.besked {{ max-width: 100%; border-radius: 0.5rem; margin-top: 0.5rem; }}
</style>
</head>
<body>
<main>
<nav>
<a href="/">Forside</a>
<a href="/turne">Turné</a>
<a href="/brevkasse">Brevkasse</a>
<a href="/opslagstavle">Opslagstavle</a>
<a href="/om">Om os</a>
</nav>
{body}
<p class="muted">© BAGGER &amp; FELDTHAUS • STRIK &amp; DRIK</p>
</main>
</body>
</html>"#
    ))
}

/// `GET /`
pub async fn home() -> Html<String> {
    page(
        "Forside",
        r#"<h1>STRIK &amp; DRIK</h1>
<p>Komedie og strik på samme scene. Tag strikketøjet med, vi har drikkevarerne.</p>
<div class="card">
<p>Skriv til vores <a href="/brevkasse">brevkasse</a> — med kærlighed, sjove historier og spørgsmål.
Alle beskeder vises på <a href="/opslagstavle">opslagstavlen</a>.</p>
</div>"#,
    )
}

/// `GET /turne`
pub async fn tour() -> Html<String> {
    let mut rows = String::new();
    for td in &TOUR_DATES {
        let ticket = if td.sold_out {
            r#"<span class="soldout">UDSOLGT</span>"#.to_string()
        } else {
            format!(r#"<a href="{}">Billetter</a>"#, td.ticket_link)
        };
        rows.push_str(&format!(
            r#"<div class="card"><strong>{}</strong> — {} / {} — {}</div>"#,
            td.date, td.city, td.location, ticket
        ));
    }
    page("Turné", &format!("<h1>TURNÉ 2025</h1>{}", rows))
}

/// `GET /om`
pub async fn about() -> Html<String> {
    page(
        "Om os",
        r#"<h1>OM OS</h1>
<p>Bagger &amp; Feldthaus tager strikkepindene med på scenen og blander
komik, garn og historier fra det virkelige liv.</p>"#,
    )
}

/// `GET /brevkasse` — points at the terminal composer (CLI or API).
pub async fn composer_page() -> Html<String> {
    page(
        "Brevkasse",
        r#"<h1>BREVKASSEN</h1>
<div class="card">
<p>Alle beskeder vises på <a href="/opslagstavle">opslagstavlen</a> og kan blive
brugt i forestillingen "STRIK &amp; DRIK".</p>
<ul>
<li>Vær ærlig og personlig</li>
<li>Inkluder et billede hvis relevant</li>
<li>Alle emner er velkomne</li>
</ul>
<p class="muted">Send en besked via <code>POST /api/messages</code>, upload billeder via
<code>POST /api/upload</code>, eller brug terminalen: <code>brevkasse --compose</code>.</p>
</div>"#,
    )
}

/// `GET /opslagstavle` — the board itself.
pub async fn board_page(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Html<String> {
    let body = match state.board.phase() {
        BoardPhase::Loading => "<div class=\"card\">Indlæser beskeder...</div>".to_string(),
        BoardPhase::Error => format!(
            "<div class=\"card\">Der opstod en fejl: {}</div>",
            html_escape(&state.board.error().unwrap_or_default())
        ),
        BoardPhase::Empty => {
            r#"<div class="card">Ingen beskeder endnu — vær den første til at skrive i
<a href="/brevkasse">brevkassen</a>!</div>"#
                .to_string()
        }
        BoardPhase::Populated => {
            let now = Utc::now();
            let mut cards = String::new();
            for msg in state.board.snapshot(query.sort) {
                let image = match &msg.image_url {
                    Some(url) => format!(
                        r#"<img class="besked" src="{url}" alt="Billede fra {name}"
 onerror="this.style.display='none';this.insertAdjacentHTML('afterend','<p class=muted>Billedet kunne ikke indlæses</p>')">"#,
                        url = html_escape(url),
                        name = html_escape(&msg.author_name),
                    ),
                    None => String::new(),
                };
                cards.push_str(&format!(
                    r#"<div class="card" data-id="{id}">
<strong>{name}</strong> <span class="muted">{ago}</span>
<button class="like" data-id="{id}" data-likes="{likes}">♥ <span>{likes}</span></button>
<p>{body}</p>{image}
</div>"#,
                    id = msg.id,
                    name = html_escape(&msg.author_name),
                    ago = format_time_ago(msg.created_at, now),
                    likes = msg.effective_likes(),
                    body = html_escape(msg.visible_body()).replace('\n', "<br>"),
                    image = image,
                ));
            }
            cards
        }
    };

    let sort_toggle = match query.sort {
        SortOrder::Newest => r#"<p><a href="/opslagstavle?sort=most_liked">Sortér: Mest populære</a></p>"#,
        SortOrder::MostLiked => r#"<p><a href="/opslagstavle?sort=newest">Sortér: Nyeste</a></p>"#,
    };

    page(
        "Opslagstavle",
        &format!(
            "<h1>OPSLAGSTAVLEN</h1>{}{}{}",
            sort_toggle, body, LIKE_SCRIPT
        ),
    )
}

/// The client half of the like counter: a per-browser liked-set in
/// localStorage, optimistic count updates, and a fire-and-forget POST.
/// Failures are swallowed; the local state is never rolled back.
const LIKE_SCRIPT: &str = r#"<script>
const liked = JSON.parse(localStorage.getItem('likedMessages') || '{}');
document.querySelectorAll('button.like').forEach(btn => {
  const id = btn.dataset.id;
  if (liked[id]) btn.classList.add('liked');
  btn.addEventListener('click', () => {
    const was = !!liked[id];
    liked[id] = !was;
    localStorage.setItem('likedMessages', JSON.stringify(liked));
    const count = Math.max(0, parseInt(btn.dataset.likes, 10) + (was ? -1 : 1));
    btn.dataset.likes = count;
    btn.querySelector('span').textContent = count;
    btn.classList.toggle('liked', !was);
    fetch(`/api/messages/${id}/likes`, {
      method: 'POST',
      headers: {'content-type': 'application/json'},
      body: JSON.stringify({like_count: count})
    }).catch(() => {});
  });
});
</script>"#;

fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Relative timestamp label in Danish, falling back to a plain date for
/// anything older than a week.
pub fn format_time_ago(created_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - created_at).num_seconds().max(0);
    if secs < 60 {
        "Lige nu".into()
    } else if secs < 3600 {
        let minutes = secs / 60;
        format!(
            "{} {} siden",
            minutes,
            if minutes == 1 { "minut" } else { "minutter" }
        )
    } else if secs < 86_400 {
        let hours = secs / 3600;
        format!(
            "{} {} siden",
            hours,
            if hours == 1 { "time" } else { "timer" }
        )
    } else if secs < 604_800 {
        let days = secs / 86_400;
        format!("{} {} siden", days, if days == 1 { "dag" } else { "dage" })
    } else {
        created_at.format("%d. %b %Y").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn time_ago_buckets() {
        let now = Utc::now();
        assert_eq!(format_time_ago(now, now), "Lige nu");
        assert_eq!(format_time_ago(now - Duration::seconds(61), now), "1 minut siden");
        assert_eq!(
            format_time_ago(now - Duration::minutes(5), now),
            "5 minutter siden"
        );
        assert_eq!(format_time_ago(now - Duration::hours(2), now), "2 timer siden");
        assert_eq!(format_time_ago(now - Duration::days(3), now), "3 dage siden");
        // Clock skew never yields negative labels.
        assert_eq!(format_time_ago(now + Duration::seconds(30), now), "Lige nu");
    }

    #[test]
    fn escapes_html() {
        assert_eq!(html_escape("<b>&\"'"), "&lt;b&gt;&amp;&quot;&#39;");
    }
}
