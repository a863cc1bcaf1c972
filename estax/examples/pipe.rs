use std::io;
use std::io::Write;

use bytes::BytesMut;

use estax::writer::{Encoder, Item};
use estax::{Error, Event, EventRead, PullReader};

fn encode_event(
	enc: &mut Encoder,
	ev: &Event,
	buf: &mut BytesMut,
) -> Result<(), estax::writer::Error> {
	match ev {
		Event::XmlDeclaration(..) => enc.encode(Item::XmlDeclaration, buf),
		Event::DocumentType(_, name) => enc.encode(Item::DocumentType(name), buf),
		Event::ProcessingInstruction(_, pi) => enc.encode(
			Item::ProcessingInstruction(
				&pi.target,
				if pi.data.len() > 0 {
					Some(&*pi.data)
				} else {
					None
				},
			),
			buf,
		),
		Event::Comment(_, text) => enc.encode(Item::Comment(text), buf),
		Event::StartElement(_, el) => {
			enc.encode(Item::ElementHeadStart(&el.name), buf)?;
			for attr in el.attributes.iter() {
				enc.encode(Item::Attribute(&attr.name, &attr.value), buf)?;
			}
			if el.empty {
				enc.encode(Item::ElementFoot, buf)
			} else {
				enc.encode(Item::ElementHeadEnd, buf)
			}
		}
		Event::EndElement(..) => enc.encode(Item::ElementFoot, buf),
		Event::Text(_, text) => enc.encode(Item::Text(text), buf),
		Event::CData(_, text) => enc.encode(Item::CData(text), buf),
		Event::EndOfDocument(_) => Ok(()),
	}
}

fn main() {
	let stdin = io::BufReader::new(io::stdin());
	let mut stdout = io::stdout();
	let mut enc = Encoder::new();
	let mut reader = PullReader::new(stdin);
	let mut buf = BytesMut::with_capacity(8192);
	let result = reader.read_all(|ev| {
		encode_event(&mut enc, &ev, &mut buf).expect("failed to encode xml");
		stdout
			.write_all(&buf[..])
			.expect("failed to write to stdout");
		buf.clear();
	});
	match result {
		Ok(()) => (),
		Err(Error::IO(e)) => panic!("I/O error: {}", e),
		Err(e) => panic!("invalid XML on input: {}", e),
	}
}
