//! RHESSI flare-list archive.
//!
//! The flare list is one large static CSV sorted by start time. Rather
//! than materializing the whole archive, translation scans from the
//! configured byte offset and stops at the first row past the query
//! window.

use chrono::{DateTime, Utc};
use common::{Error, EventLink, EventView, Result, SolarEvent, TimeWindow};
use serde_json::{json, Value};
use tracing::warn;

use super::{parse_datetime, ExtraParams, PendingEvent, PendingGroup, Position};

const ARCHIVE_URL: &str =
    "https://umbra.nascom.nasa.gov/rhessi/rhessi_extras/flare_images_v2/hsi_flare_image_archive.html";
const IMAGE_PREFIX: &str = "https://umbra.nascom.nasa.gov/rhessi/rhessi_extras/flare_images_v2/";

const COLUMNS: [&str; 12] = [
    "id",
    "start",
    "peak",
    "end",
    "peakrate",
    "totalcounts",
    "xloc",
    "yloc",
    "hi_band",
    "ntime",
    "nen",
    "link",
];

const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn translate(csv: &str, extra: &ExtraParams, window: &TimeWindow) -> Result<Vec<PendingGroup>> {
    let offset = extra.offset.ok_or_else(|| {
        Error::MissingParameter("RHESSI translator requires 'offset'".into())
    })? as usize;
    let body = csv.get(offset..).ok_or_else(|| {
        Error::Translation(format!("offset {offset} is past the end of the payload"))
    })?;

    let window_start = window.start();
    let window_end = window.end();

    let mut data = Vec::new();
    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let flare = match RhessiFlare::parse(line) {
            Ok(flare) => flare,
            Err(e) => {
                warn!("skipping malformed RHESSI row: {e}");
                continue;
            }
        };
        if flare.start > window_end {
            // Rows are sorted by start time; nothing later can match.
            break;
        }
        if flare.end >= window_start {
            data.push(flare.into_pending());
        }
    }

    Ok(vec![PendingGroup {
        name: "Flare".into(),
        contact: String::new(),
        url: ARCHIVE_URL.into(),
        data,
    }])
}

/// One row of the flare list.
struct RhessiFlare {
    id: String,
    start: DateTime<Utc>,
    peak: DateTime<Utc>,
    end: DateTime<Utc>,
    peakrate: String,
    totalcounts: String,
    xloc: f64,
    yloc: f64,
    hi_band: String,
    ntime: String,
    nen: String,
    link: String,
}

impl RhessiFlare {
    fn parse(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != COLUMNS.len() {
            return Err(Error::Translation(format!(
                "expected {} fields, got {}",
                COLUMNS.len(),
                fields.len()
            )));
        }

        let datetime = |index: usize| {
            parse_datetime(fields[index]).ok_or_else(|| {
                Error::Translation(format!("bad {} time: {}", COLUMNS[index], fields[index]))
            })
        };
        let coordinate = |index: usize| {
            fields[index].parse::<f64>().map_err(|_| {
                Error::Translation(format!("bad {}: {}", COLUMNS[index], fields[index]))
            })
        };

        Ok(Self {
            id: fields[0].to_string(),
            start: datetime(1)?,
            peak: datetime(2)?,
            end: datetime(3)?,
            peakrate: fields[4].to_string(),
            totalcounts: fields[5].to_string(),
            xloc: coordinate(6)?,
            yloc: coordinate(7)?,
            hi_band: fields[8].to_string(),
            ntime: fields[9].to_string(),
            nen: fields[10].to_string(),
            link: fields[11].to_string(),
        })
    }

    fn url(&self) -> String {
        format!("{IMAGE_PREFIX}{}", self.link)
    }

    fn source_json(&self) -> Value {
        json!({
            "id": self.id,
            "start": self.start.format(DISPLAY_FORMAT).to_string(),
            "peak": self.peak.format(DISPLAY_FORMAT).to_string(),
            "end": self.end.format(DISPLAY_FORMAT).to_string(),
            "peakrate": self.peakrate,
            "totalcounts": self.totalcounts,
            "xloc": self.xloc,
            "yloc": self.yloc,
            "hi_band": self.hi_band,
            "ntime": self.ntime,
            "nen": self.nen,
            "link": self.url(),
        })
    }

    fn into_pending(self) -> PendingEvent {
        let source = self.source_json();
        let url = self.url();
        let label = format!("RHESSI {}", self.id);
        let event = SolarEvent {
            id: self.id,
            label: label.clone(),
            short_label: label,
            event_type: "FL".into(),
            version: String::new(),
            start: self.start,
            end: self.end,
            source: source.clone(),
            views: vec![EventView {
                name: "Main".into(),
                content: source,
            }],
            hpc_x: 0.0,
            hpc_y: 0.0,
            link: Some(EventLink {
                text: "Full analysis".into(),
                url,
            }),
        };
        PendingEvent {
            event,
            position: Position::Projected {
                x: self.xloc,
                y: self.yloc,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDateTime};

    const HEADER: &str = "id,start,peak,end,peakrate,totalcounts,xloc,yloc,hi_band,ntime,nen,link\n";

    fn csv() -> String {
        format!(
            "{HEADER}\
             2021213,2002-02-12 02:14:16,2002-02-12 02:15:30,2002-02-12 02:17:40,56,12528,892.0,251.0,12-25,10,5,2002/02/12/2021213\n\
             2021214,2002-02-12 21:29:08,2002-02-12 21:30:14,2002-02-12 21:31:24,30,7052,-330.0,-270.0,6-12,8,4,2002/02/12/2021214\n\
             2021301,2002-03-01 00:00:00,2002-03-01 00:02:00,2002-03-01 00:05:00,44,9000,100.0,100.0,6-12,8,4,2002/03/01/2021301\n"
        )
    }

    fn extra() -> ExtraParams {
        ExtraParams {
            dataset: None,
            offset: Some(HEADER.len() as u64),
        }
    }

    fn ts(s: &str) -> DateTime<Utc> {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
            .expect("valid test timestamp")
            .and_utc()
    }

    #[test]
    fn keeps_rows_overlapping_the_window() {
        let window = TimeWindow::new(ts("2002-02-13 00:00:00"), Duration::days(-1));
        let groups = translate(&csv(), &extra(), &window).expect("translated");
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "Flare");
        assert_eq!(groups[0].data.len(), 2);

        let event = &groups[0].data[0].event;
        assert_eq!(event.id, "2021213");
        assert_eq!(event.label, "RHESSI 2021213");
        assert_eq!(event.event_type, "FL");
        assert_eq!(
            groups[0].data[0].position,
            Position::Projected { x: 892.0, y: 251.0 }
        );
        let link = event.link.as_ref().expect("link");
        assert_eq!(link.text, "Full analysis");
        assert!(link.url.ends_with("2002/02/12/2021213"));
    }

    #[test]
    fn stops_at_the_first_row_past_the_window() {
        // A window before every row: the sorted-list early exit kicks in
        // and nothing is returned.
        let window = TimeWindow::new(ts("2002-01-01 00:00:00"), Duration::days(1));
        let groups = translate(&csv(), &extra(), &window).expect("translated");
        assert!(groups[0].data.is_empty());
    }

    #[test]
    fn missing_offset_is_a_configuration_error() {
        let window = TimeWindow::new(ts("2002-02-13 00:00:00"), Duration::days(-1));
        let result = translate(&csv(), &ExtraParams::default(), &window);
        assert!(matches!(result, Err(Error::MissingParameter(_))));
    }

    #[test]
    fn offset_skips_the_header_row() {
        // With offset 0 the header parses as a malformed row and is
        // skipped; the data rows still come through.
        let window = TimeWindow::new(ts("2002-02-13 00:00:00"), Duration::days(-1));
        let zero_offset = ExtraParams {
            dataset: None,
            offset: Some(0),
        };
        let groups = translate(&csv(), &zero_offset, &window).expect("translated");
        assert_eq!(groups[0].data.len(), 2);
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let bad = format!("{HEADER}not,a,flare\n");
        let window = TimeWindow::new(ts("2002-02-13 00:00:00"), Duration::days(-1));
        let groups = translate(&bad, &extra(), &window).expect("translated");
        assert!(groups[0].data.is_empty());
    }
}
