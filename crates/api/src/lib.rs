use db::{backend::Backend, error::Error, Database, Survey};
use http_body_util::{BodyExt, Full};
use hyper::{
    body::{Body, Bytes},
    header::{
        HeaderValue, ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
        ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE,
    },
    Method, Request, Response, StatusCode,
};

type Reply = Response<Full<Bytes>>;

/// Reason for answering with something other than success.
enum Rejection {
    /// The request itself is unacceptable.
    Status(StatusCode),
    /// The store refused or failed the operation.
    Store(Error),
}

impl From<StatusCode> for Rejection {
    fn from(status: StatusCode) -> Self {
        Self::Status(status)
    }
}

impl From<Error> for Rejection {
    fn from(err: Error) -> Self {
        Self::Store(err)
    }
}

const fn status_of(err: Error) -> StatusCode {
    match err {
        Error::BadInput => StatusCode::BAD_REQUEST,
        Error::NotFound => StatusCode::NOT_FOUND,
        Error::NotReady | Error::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        Error::Malformed | Error::Fatal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Recognized query parameters. Unknown keys and chunks without `=` are skipped.
#[derive(Debug, Default, PartialEq, Eq)]
struct Params<'q> {
    survey: Option<&'q str>,
    question: Option<&'q str>,
    answer: Option<&'q str>,
    recreate: bool,
}

fn parse_params(query: &str) -> Params<'_> {
    let mut params = Params::default();
    for chunk in query.split('&') {
        let (key, value) = match chunk.split_once('=') {
            Some(pair) => pair,
            _ => continue,
        };
        let target = match key {
            "surveyId" => &mut params.survey,
            "questionId" => &mut params.question,
            "answerId" => &mut params.answer,
            "recreate" => {
                params.recreate = !value.is_empty();
                continue;
            }
            _ => continue,
        };
        *target = Some(value);
    }
    params
}

fn reply(status: StatusCode, content: Option<(&'static str, Bytes)>) -> Reply {
    let (kind, body) = content.unzip();
    let mut res = Response::new(Full::new(body.unwrap_or_default()));
    *res.status_mut() = status;

    let headers = res.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
    if let Some(kind) = kind {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(kind));
    }
    res
}

fn text(status: StatusCode, body: String) -> Reply {
    reply(status, Some(("text/plain", body.into())))
}

async fn route<B, T>(req: Request<T>, db: &Database<B>) -> Result<Reply, Rejection>
where
    B: Backend,
    T: Body,
{
    // Everything is served from the root endpoint.
    if req.uri().path() != "/" {
        return Err(StatusCode::NOT_FOUND.into());
    }

    let (parts, body) = req.into_parts();
    let params = parse_params(parts.uri.query().unwrap_or_default());

    match parts.method {
        Method::OPTIONS => {
            let mut res = reply(StatusCode::NO_CONTENT, None);
            let headers = res.headers_mut();
            headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"));
            headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("Content-Type"));
            Ok(res)
        }
        Method::POST => {
            let bytes = body.collect().await.map_err(|_| StatusCode::BAD_REQUEST)?.to_bytes();
            let survey: Survey = serde_json::from_slice(&bytes).map_err(|err| {
                log::debug!("rejected survey payload: {err}");
                StatusCode::BAD_REQUEST
            })?;
            let id = db.create_survey(&survey).await?;
            Ok(text(StatusCode::CREATED, id))
        }
        Method::GET => {
            let id = params.survey.ok_or(StatusCode::BAD_REQUEST)?;
            let survey = db.get_survey(id).await?;
            let json = serde_json::to_vec(&survey).map_err(|_| Error::Fatal)?;
            Ok(reply(StatusCode::OK, Some(("application/json", json.into()))))
        }
        Method::PUT if params.recreate => {
            if !db.ensure_ready().await? {
                return Err(Error::NotReady.into());
            }
            let id = db.rebuild_seed_data().await?;
            Ok(text(StatusCode::OK, id))
        }
        Method::PUT => {
            let Params { survey: Some(survey), question: Some(question), answer: Some(answer), .. } = params else {
                return Err(StatusCode::BAD_REQUEST.into());
            };
            let question = question.parse().map_err(|_| StatusCode::BAD_REQUEST)?;
            let answer = answer.parse().map_err(|_| StatusCode::BAD_REQUEST)?;
            db.vote(survey, question, answer).await?;
            Ok(reply(StatusCode::NO_CONTENT, None))
        }
        Method::DELETE => {
            let status = if db.teardown().await? { StatusCode::NO_CONTENT } else { StatusCode::ACCEPTED };
            Ok(reply(status, None))
        }
        _ => Err(StatusCode::METHOD_NOT_ALLOWED.into()),
    }
}

/// Serves a single request against the survey store. Failures are turned into responses, so this
/// never fails on its own.
pub async fn try_respond<B, T>(req: Request<T>, db: &Database<B>) -> Reply
where
    B: Backend,
    T: Body,
{
    match route(req, db).await {
        Ok(res) => res,
        Err(Rejection::Status(status)) => reply(status, None),
        Err(Rejection::Store(err)) => {
            let status = status_of(err);
            if status.is_server_error() {
                log::error!("request failed: {err}");
            }
            text(status, err.to_string())
        }
    }
}
